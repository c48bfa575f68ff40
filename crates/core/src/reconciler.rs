//! Settings reconciler: turns a before/after settings snapshot into the
//! resync commands the control plane must run.
//!
//! [`SettingsReconciler::reconcile`] runs a fixed battery of independent
//! delta checks, in a fixed order, each issuing at most one command. The
//! checks never short-circuit each other: independent aspects of the
//! configuration can change in one settings save, so all of them always run.
//! Runs synchronously on the caller's thread; every matching check is one
//! blocking call into a collaborator, and the core never waits on command
//! completion beyond that call returning.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::{CheckFailure, CoreError, ReconcileError};
use crate::resync::{
    CacheManager, HookManager, ProjectDirectory, ResyncAction, ResyncClient, ResyncCommand,
    ResyncScope,
};
use crate::settings::{ReconcileRequest, SettingKey, SettingsSnapshot};

// Key groups, one per value-delta check.

const HIERARCHY_KEYS: [SettingKey; 3] = [
    SettingKey::GitoliteGlobalStorageDir,
    SettingKey::GitoliteRedmineStorageDir,
    SettingKey::HierarchicalOrganisation,
];

const CONFIG_FILE_KEYS: [SettingKey; 2] = [
    SettingKey::GitoliteConfigFile,
    SettingKey::GitoliteConfigHasAdminKey,
];

const NOTIFY_KEYS: [SettingKey; 4] = [
    SettingKey::GitoliteNotifyGlobalPrefix,
    SettingKey::GitoliteNotifyGlobalSenderAddress,
    SettingKey::GitoliteNotifyGlobalInclude,
    SettingKey::GitoliteNotifyGlobalExclude,
];

const HOOK_CONFIG_KEYS: [SettingKey; 3] = [
    SettingKey::GitoliteHooksDebug,
    SettingKey::GitoliteForceHooksUpdate,
    SettingKey::GitoliteHooksAreAsynchronous,
];

/// Runs the settings-change check battery against the control plane.
pub struct SettingsReconciler {
    client: Arc<dyn ResyncClient>,
    hooks: Arc<dyn HookManager>,
    cache: Arc<dyn CacheManager>,
    directory: Arc<dyn ProjectDirectory>,
}

impl SettingsReconciler {
    pub fn new(
        client: Arc<dyn ResyncClient>,
        hooks: Arc<dyn HookManager>,
        cache: Arc<dyn CacheManager>,
        directory: Arc<dyn ProjectDirectory>,
    ) -> Self {
        Self {
            client,
            hooks,
            cache,
            directory,
        }
    }

    /// Run every check against the old/new snapshots and the request.
    ///
    /// A failed check never prevents the remaining checks from running;
    /// failures are aggregated into one [`ReconcileError`]. Commands already
    /// issued are independent external side effects and are not rolled back.
    pub fn reconcile(
        &self,
        old: &SettingsSnapshot,
        new: &SettingsSnapshot,
        request: &ReconcileRequest,
    ) -> Result<(), ReconcileError> {
        let mut failures: Vec<CheckFailure> = Vec::new();
        let mut track = |check: &'static str, outcome: Result<(), CoreError>| {
            if let Err(source) = outcome {
                warn!(check, error = %source, "reconciliation check failed");
                failures.push(CheckFailure { check, source });
            }
        };

        track("repo_hierarchy", self.check_repo_hierarchy(old, new));
        track("gitolite_config", self.check_gitolite_config(old, new));
        track(
            "notification_defaults",
            self.check_notification_defaults(old, new),
        );
        track("hook_install", self.check_hook_install(old, new));
        track("hook_config", self.check_hook_config(old, new));
        track("cache_config", self.check_cache_config(old, new));
        track("resync_projects", self.do_resync_projects(request));
        track("resync_ssh_keys", self.do_resync_ssh_keys(request));
        track("flush_cache", self.do_flush_cache(request));
        track("purge_recycle_bin", self.do_purge_recycle_bin(request));

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError { failures })
        }
    }

    /// Storage layout changed: every repository path assumption is invalid,
    /// so each root project's full subtree must be moved. Closed and
    /// archived roots are included.
    fn check_repo_hierarchy(
        &self,
        old: &SettingsSnapshot,
        new: &SettingsSnapshot,
    ) -> Result<(), CoreError> {
        if !old.differs_in(new, &HIERARCHY_KEYS) {
            return Ok(());
        }

        let roots: Vec<_> = self
            .directory
            .root_projects(true)?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if roots.is_empty() {
            return Ok(());
        }

        info!(
            root_projects = roots.len(),
            "repository hierarchy configuration changed, moving repository trees"
        );
        self.client.issue(
            ResyncCommand::new(
                ResyncAction::MoveRepositoriesTree,
                ResyncScope::Projects(roots),
            )
            .flushing_cache(),
        )?;
        Ok(())
    }

    /// The rendered config file or its admin-key flag changed: a full
    /// rewrite of the generated configuration is the only safe response.
    fn check_gitolite_config(
        &self,
        old: &SettingsSnapshot,
        new: &SettingsSnapshot,
    ) -> Result<(), CoreError> {
        if old.differs_in(new, &CONFIG_FILE_KEYS) {
            info!("gitolite config file changed, resyncing all projects (active, closed, archived)");
            self.client.issue(ResyncCommand::new(
                ResyncAction::UpdateProjects,
                ResyncScope::All,
            ))?;
        }
        Ok(())
    }

    /// Notification defaults only affect live projects' hook behaviour.
    fn check_notification_defaults(
        &self,
        old: &SettingsSnapshot,
        new: &SettingsSnapshot,
    ) -> Result<(), CoreError> {
        if old.differs_in(new, &NOTIFY_KEYS) {
            info!("notification defaults changed, resyncing active projects");
            self.client.issue(ResyncCommand::new(
                ResyncAction::UpdateProjects,
                ResyncScope::Active,
            ))?;
        }
        Ok(())
    }

    /// The gitolite system user changed: make sure the new account carries
    /// our hooks. Safe to call when they are already installed.
    fn check_hook_install(
        &self,
        old: &SettingsSnapshot,
        new: &SettingsSnapshot,
    ) -> Result<(), CoreError> {
        if old.differs_in(new, &[SettingKey::GitoliteUser]) {
            info!("gitolite user changed, checking hook installation");
            self.hooks.check_install()?;
        }
        Ok(())
    }

    /// Hook parameters changed: rewrite the generated git-config values.
    fn check_hook_config(
        &self,
        old: &SettingsSnapshot,
        new: &SettingsSnapshot,
    ) -> Result<(), CoreError> {
        if old.differs_in(new, &HOOK_CONFIG_KEYS) {
            info!("hook parameters changed, verifying git-config values");
            self.hooks.verify_config_params()?;
        }
        Ok(())
    }

    /// The cache max-age changed: evict entries stale under the new policy.
    /// This is threshold-based eviction, not a full flush.
    fn check_cache_config(
        &self,
        old: &SettingsSnapshot,
        new: &SettingsSnapshot,
    ) -> Result<(), CoreError> {
        if !old.differs_in(new, &[SettingKey::GitoliteCacheMaxTime]) {
            return Ok(());
        }
        // Snapshots are pre-validated upstream; without a usable new value
        // there is no threshold to purge against.
        let Some(max_age) = new.integer(SettingKey::GitoliteCacheMaxTime) else {
            return Ok(());
        };
        let max_age = Duration::from_secs(max_age.max(0) as u64);
        let purged = self.cache.purge_stale(max_age)?;
        info!(purged, max_age_secs = max_age.as_secs(), "purged stale cache entries");
        Ok(())
    }

    /// User-initiated: resync every project in force mode, independent of
    /// any value delta.
    fn do_resync_projects(&self, request: &ReconcileRequest) -> Result<(), CoreError> {
        if request.resync_projects {
            info!("forced resync of all projects (active, closed, archived)");
            self.client.issue(
                ResyncCommand::new(ResyncAction::UpdateProjects, ResyncScope::All).forced(),
            )?;
        }
        Ok(())
    }

    /// User-initiated: resync every installed SSH key.
    fn do_resync_ssh_keys(&self, request: &ReconcileRequest) -> Result<(), CoreError> {
        if request.resync_ssh_keys {
            info!("forced resync of all ssh keys");
            self.client.issue(ResyncCommand::new(
                ResyncAction::ResyncAllSshKeys,
                ResyncScope::All,
            ))?;
        }
        Ok(())
    }

    /// User-initiated: wipe the git cache wholesale.
    fn do_flush_cache(&self, request: &ReconcileRequest) -> Result<(), CoreError> {
        if request.flush_cache {
            info!("flushing git cache");
            self.cache.truncate_all()?;
        }
        Ok(())
    }

    /// User-initiated: permanently delete repositories from the recycle bin.
    fn do_purge_recycle_bin(&self, request: &ReconcileRequest) -> Result<(), CoreError> {
        if !request.trash_repo_ids.is_empty() {
            info!(
                repositories = request.trash_repo_ids.len(),
                "purging recycle bin"
            );
            self.client.issue(ResyncCommand::new(
                ResyncAction::PurgeRecycleBin,
                ResyncScope::Repositories(request.trash_repo_ids.clone()),
            ))?;
        }
        Ok(())
    }
}
