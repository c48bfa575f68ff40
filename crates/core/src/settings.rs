//! Plugin settings: the typed settings struct, the flat snapshot consumed by
//! the reconciler, and the per-save reconciliation request.
//!
//! [`PluginSettings`] is the TOML-loadable configuration with per-field
//! defaults. [`SettingsSnapshot`] is the immutable key/value view taken at
//! two points in time (before and after a settings save); the reconciler
//! only ever compares snapshots, never the typed struct.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

// ---------------------------------------------------------------------------
// Setting keys and values
// ---------------------------------------------------------------------------

/// The configuration keys tracked by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    GitoliteGlobalStorageDir,
    GitoliteRedmineStorageDir,
    HierarchicalOrganisation,
    GitoliteConfigFile,
    GitoliteConfigHasAdminKey,
    GitoliteNotifyGlobalPrefix,
    GitoliteNotifyGlobalSenderAddress,
    GitoliteNotifyGlobalInclude,
    GitoliteNotifyGlobalExclude,
    GitoliteUser,
    GitoliteHooksDebug,
    GitoliteForceHooksUpdate,
    GitoliteHooksAreAsynchronous,
    GitoliteCacheMaxTime,
}

impl SettingKey {
    /// Snake-case key name, matching the settings file field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GitoliteGlobalStorageDir => "gitolite_global_storage_dir",
            Self::GitoliteRedmineStorageDir => "gitolite_redmine_storage_dir",
            Self::HierarchicalOrganisation => "hierarchical_organisation",
            Self::GitoliteConfigFile => "gitolite_config_file",
            Self::GitoliteConfigHasAdminKey => "gitolite_config_has_admin_key",
            Self::GitoliteNotifyGlobalPrefix => "gitolite_notify_global_prefix",
            Self::GitoliteNotifyGlobalSenderAddress => "gitolite_notify_global_sender_address",
            Self::GitoliteNotifyGlobalInclude => "gitolite_notify_global_include",
            Self::GitoliteNotifyGlobalExclude => "gitolite_notify_global_exclude",
            Self::GitoliteUser => "gitolite_user",
            Self::GitoliteHooksDebug => "gitolite_hooks_debug",
            Self::GitoliteForceHooksUpdate => "gitolite_force_hooks_update",
            Self::GitoliteHooksAreAsynchronous => "gitolite_hooks_are_asynchronous",
            Self::GitoliteCacheMaxTime => "gitolite_cache_max_time",
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A tracked configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl SettingValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable key/value view of the settings at one point in time.
///
/// Equality is per-key value comparison; a key present on one side and
/// absent on the other counts as a difference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsSnapshot {
    values: HashMap<SettingKey, SettingValue>,
}

impl SettingsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, for tests and manual construction.
    pub fn with(mut self, key: SettingKey, value: impl Into<SettingValue>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn get(&self, key: SettingKey) -> Option<&SettingValue> {
        self.values.get(&key)
    }

    /// Integer view of a key, `None` when absent or not an integer.
    pub fn integer(&self, key: SettingKey) -> Option<i64> {
        self.values.get(&key).and_then(SettingValue::as_int)
    }

    /// Whether any of `keys` carries a different value in `other`.
    pub fn differs_in(&self, other: &SettingsSnapshot, keys: &[SettingKey]) -> bool {
        keys.iter()
            .any(|key| self.values.get(key) != other.values.get(key))
    }
}

impl FromIterator<(SettingKey, SettingValue)> for SettingsSnapshot {
    fn from_iter<I: IntoIterator<Item = (SettingKey, SettingValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation request
// ---------------------------------------------------------------------------

/// Explicit user-requested actions accompanying one settings save.
///
/// Created once per save, consumed immediately, never persisted. Every flag
/// defaults to off.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileRequest {
    /// Force a resync of every project, bypassing the control plane's own
    /// skip-if-unchanged optimization.
    pub resync_projects: bool,
    /// Force a resync of every installed SSH key.
    pub resync_ssh_keys: bool,
    /// Truncate the entire git cache.
    pub flush_cache: bool,
    /// Repositories in the recycle bin pending permanent deletion.
    pub trash_repo_ids: Vec<String>,
}

impl ReconcileRequest {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Typed settings
// ---------------------------------------------------------------------------

/// The full plugin configuration, loadable from TOML.
///
/// Defaults follow the upstream plugin: a `git` system user, repositories
/// under `repositories/`, hierarchical layout, a one-day cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default = "default_global_storage_dir")]
    pub gitolite_global_storage_dir: String,

    #[serde(default)]
    pub gitolite_redmine_storage_dir: String,

    #[serde(default = "default_true")]
    pub hierarchical_organisation: bool,

    #[serde(default = "default_config_file")]
    pub gitolite_config_file: String,

    #[serde(default = "default_true")]
    pub gitolite_config_has_admin_key: bool,

    #[serde(default = "default_notify_prefix")]
    pub gitolite_notify_global_prefix: String,

    #[serde(default = "default_notify_sender")]
    pub gitolite_notify_global_sender_address: String,

    /// Mail addresses always notified by the post-receive hook.
    #[serde(default)]
    pub gitolite_notify_global_include: Vec<String>,

    /// Mail addresses never notified by the post-receive hook.
    #[serde(default)]
    pub gitolite_notify_global_exclude: Vec<String>,

    #[serde(default = "default_gitolite_user")]
    pub gitolite_user: String,

    #[serde(default)]
    pub gitolite_hooks_debug: bool,

    #[serde(default)]
    pub gitolite_force_hooks_update: bool,

    #[serde(default = "default_true")]
    pub gitolite_hooks_are_asynchronous: bool,

    /// Maximum age of a git cache entry, in seconds.
    #[serde(default = "default_cache_max_time")]
    pub gitolite_cache_max_time: i64,
}

fn default_global_storage_dir() -> String {
    "repositories/".into()
}
fn default_config_file() -> String {
    "gitolite.conf".into()
}
fn default_notify_prefix() -> String {
    "[REDMINE]".into()
}
fn default_notify_sender() -> String {
    "redmine@example.net".into()
}
fn default_gitolite_user() -> String {
    "git".into()
}
fn default_cache_max_time() -> i64 {
    86_400
}
fn default_true() -> bool {
    true
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            gitolite_global_storage_dir: default_global_storage_dir(),
            gitolite_redmine_storage_dir: String::new(),
            hierarchical_organisation: true,
            gitolite_config_file: default_config_file(),
            gitolite_config_has_admin_key: true,
            gitolite_notify_global_prefix: default_notify_prefix(),
            gitolite_notify_global_sender_address: default_notify_sender(),
            gitolite_notify_global_include: Vec::new(),
            gitolite_notify_global_exclude: Vec::new(),
            gitolite_user: default_gitolite_user(),
            gitolite_hooks_debug: false,
            gitolite_force_hooks_update: false,
            gitolite_hooks_are_asynchronous: true,
            gitolite_cache_max_time: default_cache_max_time(),
        }
    }
}

impl PluginSettings {
    /// Load settings from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SettingsError::FileNotFound(path.display().to_string())
            } else {
                SettingsError::Io(e)
            }
        })?;
        toml::from_str(&raw).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Render the settings as a TOML document.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        toml::to_string_pretty(self).map_err(|e| SettingsError::Serialize(e.to_string()))
    }

    /// Flatten into the snapshot form the reconciler compares.
    ///
    /// List-valued settings are joined with commas so that per-key equality
    /// stays a plain value comparison.
    pub fn snapshot(&self) -> SettingsSnapshot {
        use SettingKey::*;
        [
            (GitoliteGlobalStorageDir, SettingValue::from(self.gitolite_global_storage_dir.clone())),
            (GitoliteRedmineStorageDir, SettingValue::from(self.gitolite_redmine_storage_dir.clone())),
            (HierarchicalOrganisation, SettingValue::from(self.hierarchical_organisation)),
            (GitoliteConfigFile, SettingValue::from(self.gitolite_config_file.clone())),
            (GitoliteConfigHasAdminKey, SettingValue::from(self.gitolite_config_has_admin_key)),
            (GitoliteNotifyGlobalPrefix, SettingValue::from(self.gitolite_notify_global_prefix.clone())),
            (GitoliteNotifyGlobalSenderAddress, SettingValue::from(self.gitolite_notify_global_sender_address.clone())),
            (GitoliteNotifyGlobalInclude, SettingValue::from(self.gitolite_notify_global_include.join(","))),
            (GitoliteNotifyGlobalExclude, SettingValue::from(self.gitolite_notify_global_exclude.join(","))),
            (GitoliteUser, SettingValue::from(self.gitolite_user.clone())),
            (GitoliteHooksDebug, SettingValue::from(self.gitolite_hooks_debug)),
            (GitoliteForceHooksUpdate, SettingValue::from(self.gitolite_force_hooks_update)),
            (GitoliteHooksAreAsynchronous, SettingValue::from(self.gitolite_hooks_are_asynchronous)),
            (GitoliteCacheMaxTime, SettingValue::from(self.gitolite_cache_max_time)),
        ]
        .into_iter()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_equal_for_identical_settings() {
        let settings = PluginSettings::default();
        assert_eq!(settings.snapshot(), settings.snapshot());
    }

    #[test]
    fn test_differs_in_detects_single_key_change() {
        let old = PluginSettings::default().snapshot();
        let new = PluginSettings {
            gitolite_user: "gitolite".into(),
            ..PluginSettings::default()
        }
        .snapshot();

        assert!(old.differs_in(&new, &[SettingKey::GitoliteUser]));
        assert!(!old.differs_in(&new, &[SettingKey::GitoliteConfigFile]));
    }

    #[test]
    fn test_missing_key_counts_as_difference() {
        let old = SettingsSnapshot::new().with(SettingKey::GitoliteUser, "git");
        let new = SettingsSnapshot::new();
        assert!(old.differs_in(&new, &[SettingKey::GitoliteUser]));
    }

    #[test]
    fn test_toml_round_trip_with_defaults() {
        let settings = PluginSettings::default();
        let rendered = settings.to_toml().unwrap();
        let parsed: PluginSettings = toml::from_str(&rendered).unwrap();
        assert_eq!(settings, parsed);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let parsed: PluginSettings = toml::from_str("").unwrap();
        assert_eq!(parsed, PluginSettings::default());
    }
}
