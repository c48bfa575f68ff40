//! Integration tests for the settings reconciliation battery.
//!
//! These wire the real [`SettingsReconciler`] against:
//! - the recording control plane for command issuance and hooks
//! - a real SQLite-backed [`GitCacheStore`] for the cache checks
//! - a deliberately failing control plane to pin the continue-on-error
//!   aggregation behaviour

use std::sync::Arc;
use std::time::Duration;

use gitolite_sync_core::cache::GitCacheStore;
use gitolite_sync_core::errors::{CommandError, DirectoryError, HookError};
use gitolite_sync_core::models::{Project, ProjectId, ProjectStatus};
use gitolite_sync_core::reconciler::SettingsReconciler;
use gitolite_sync_core::resync::{
    CacheManager, ControlPlaneEvent, HookManager, ProjectDirectory, RecordingControlPlane,
    ResyncAction, ResyncClient, ResyncCommand, ResyncScope,
};
use gitolite_sync_core::settings::{PluginSettings, ReconcileRequest, SettingKey, SettingsSnapshot};

// ===========================================================================
// Helpers
// ===========================================================================

fn root_project(id: i64) -> Project {
    Project {
        id: ProjectId(id),
        identifier: format!("root-{id}"),
        parent_id: None,
        status: ProjectStatus::Active,
    }
}

fn recording_reconciler(
    plane: &Arc<RecordingControlPlane>,
    cache: Arc<dyn CacheManager>,
) -> SettingsReconciler {
    SettingsReconciler::new(plane.clone(), plane.clone(), cache, plane.clone())
}

// ===========================================================================
// Idempotence and no-op behaviour
// ===========================================================================

#[test]
fn reconcile_of_identical_snapshots_is_a_noop_regardless_of_content() {
    let plane = Arc::new(RecordingControlPlane::with_root_projects(vec![
        root_project(1),
        root_project(2),
    ]));

    // An arbitrary, fully populated snapshot.
    let snapshot = PluginSettings {
        gitolite_global_storage_dir: "/data/git/".into(),
        gitolite_user: "gitolite3".into(),
        gitolite_hooks_debug: true,
        gitolite_cache_max_time: 30,
        gitolite_notify_global_include: vec!["dev@example.net".into()],
        ..PluginSettings::default()
    }
    .snapshot();

    recording_reconciler(&plane, plane.clone())
        .reconcile(&snapshot, &snapshot, &ReconcileRequest::new())
        .unwrap();

    assert!(plane.events().is_empty());
}

#[test]
fn partial_snapshots_compare_per_key() {
    let plane = Arc::new(RecordingControlPlane::new());

    // A key present on one side and absent on the other is a delta.
    let old = SettingsSnapshot::new().with(SettingKey::GitoliteConfigFile, "gitolite.conf");
    let new = SettingsSnapshot::new();

    recording_reconciler(&plane, plane.clone())
        .reconcile(&old, &new, &ReconcileRequest::new())
        .unwrap();

    let commands = plane.issued_commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].action, ResyncAction::UpdateProjects);
    assert_eq!(commands[0].scope, ResyncScope::All);
}

// ===========================================================================
// Cache checks against the real store
// ===========================================================================

#[test]
fn cache_max_age_change_purges_only_stale_entries_from_the_real_store() {
    let plane = Arc::new(RecordingControlPlane::new());
    let store = Arc::new(GitCacheStore::in_memory().unwrap());
    store.store("kept", "rev-parse HEAD", "abc").unwrap();

    let old = PluginSettings::default().snapshot();
    let new = PluginSettings {
        gitolite_cache_max_time: 3_600,
        ..PluginSettings::default()
    }
    .snapshot();

    recording_reconciler(&plane, store.clone())
        .reconcile(&old, &new, &ReconcileRequest::new())
        .unwrap();

    // The fresh entry survives a threshold purge.
    assert_eq!(
        store.lookup("kept", "rev-parse HEAD").unwrap(),
        Some("abc".into())
    );
    assert!(plane.issued_commands().is_empty());
}

#[test]
fn flush_cache_request_truncates_the_real_store_wholesale() {
    let plane = Arc::new(RecordingControlPlane::new());
    let store = Arc::new(GitCacheStore::in_memory().unwrap());
    store.store("a", "rev-parse HEAD", "abc").unwrap();
    store.store("b", "rev-parse HEAD", "def").unwrap();

    let snapshot = PluginSettings::default().snapshot();
    let request = ReconcileRequest {
        flush_cache: true,
        ..ReconcileRequest::new()
    };

    recording_reconciler(&plane, store.clone())
        .reconcile(&snapshot, &snapshot, &request)
        .unwrap();

    // Full wipe, even entries younger than any max-age policy.
    assert!(store.is_empty().unwrap());
}

// ===========================================================================
// Combined saves
// ===========================================================================

#[test]
fn one_save_changing_independent_settings_issues_one_command_per_check() {
    let plane = Arc::new(RecordingControlPlane::with_root_projects(vec![
        root_project(1),
    ]));

    let old = PluginSettings::default().snapshot();
    let new = PluginSettings {
        gitolite_redmine_storage_dir: "redmine/".into(),
        gitolite_notify_global_exclude: vec!["noreply@example.net".into()],
        ..PluginSettings::default()
    }
    .snapshot();

    recording_reconciler(&plane, plane.clone())
        .reconcile(&old, &new, &ReconcileRequest::new())
        .unwrap();

    let commands = plane.issued_commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].action, ResyncAction::MoveRepositoriesTree);
    assert_eq!(
        commands[0].scope,
        ResyncScope::Projects(vec![ProjectId(1)])
    );
    assert_eq!(commands[1].action, ResyncAction::UpdateProjects);
    assert_eq!(commands[1].scope, ResyncScope::Active);
}

// ===========================================================================
// Failure aggregation
// ===========================================================================

/// Control plane whose command queue always rejects, while hooks, cache,
/// and directory reads keep working and get recorded.
struct RejectingPlane {
    inner: RecordingControlPlane,
}

impl ResyncClient for RejectingPlane {
    fn issue(&self, command: ResyncCommand) -> Result<(), CommandError> {
        Err(CommandError::Rejected {
            action: command.action.to_string(),
            detail: "queue unavailable".into(),
        })
    }
}

impl HookManager for RejectingPlane {
    fn check_install(&self) -> Result<(), HookError> {
        self.inner.check_install()
    }

    fn verify_config_params(&self) -> Result<(), HookError> {
        self.inner.verify_config_params()
    }
}

impl CacheManager for RejectingPlane {
    fn purge_stale(&self, max_age: Duration) -> Result<usize, gitolite_sync_core::errors::CacheError> {
        self.inner.purge_stale(max_age)
    }

    fn truncate_all(&self) -> Result<(), gitolite_sync_core::errors::CacheError> {
        self.inner.truncate_all()
    }
}

impl ProjectDirectory for RejectingPlane {
    fn root_projects(&self, include_all_statuses: bool) -> Result<Vec<Project>, DirectoryError> {
        self.inner.root_projects(include_all_statuses)
    }
}

#[test]
fn failed_checks_do_not_stop_the_battery_and_are_aggregated() {
    let plane = Arc::new(RejectingPlane {
        inner: RecordingControlPlane::new(),
    });

    let old = PluginSettings::default().snapshot();
    let new = PluginSettings {
        gitolite_config_file: "other.conf".into(),
        gitolite_user: "gitolite".into(),
        gitolite_hooks_debug: true,
        ..PluginSettings::default()
    }
    .snapshot();
    let request = ReconcileRequest {
        resync_ssh_keys: true,
        ..ReconcileRequest::new()
    };

    let err = SettingsReconciler::new(plane.clone(), plane.clone(), plane.clone(), plane.clone())
        .reconcile(&old, &new, &request)
        .unwrap_err();

    // Both command-issuing checks failed and both are reported.
    assert_eq!(err.failures.len(), 2);
    assert_eq!(err.failures[0].check, "gitolite_config");
    assert_eq!(err.failures[1].check, "resync_ssh_keys");

    // Checks after the first failure still ran: the hook checks recorded
    // their calls even though an earlier command was rejected.
    assert_eq!(
        plane.inner.events(),
        vec![
            ControlPlaneEvent::HookInstallChecked,
            ControlPlaneEvent::HookParamsVerified,
        ]
    );
}
