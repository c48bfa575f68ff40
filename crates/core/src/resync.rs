//! Resync commands and the collaborator interfaces they are issued through.
//!
//! The core never touches the Gitolite filesystem itself: everything goes
//! through the narrow traits defined here. Commands are fire-and-forget; the
//! core tracks issuance order only, never completion. The control-plane
//! client is expected to be idempotent per (action, project) within a short
//! window, which is what lets a coarser command supersede a narrower one
//! issued earlier in the same reconciliation call.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{CacheError, CommandError, DirectoryError, HookError};
use crate::models::{Project, ProjectId};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Action tag of a resync command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncAction {
    MoveRepositoriesTree,
    UpdateProjects,
    ResyncAllSshKeys,
    PurgeRecycleBin,
}

impl std::fmt::Display for ResyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MoveRepositoriesTree => write!(f, "move_repositories_tree"),
            Self::UpdateProjects => write!(f, "update_projects"),
            Self::ResyncAllSshKeys => write!(f, "resync_all_ssh_keys"),
            Self::PurgeRecycleBin => write!(f, "purge_recycle_bin"),
        }
    }
}

/// Breadth of a resync command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncScope {
    /// An explicit project list (possibly empty).
    Projects(Vec<ProjectId>),
    /// Every project regardless of status (active, closed, archived).
    All,
    /// Active projects only.
    Active,
    /// An explicit repository list, for recycle-bin purges.
    Repositories(Vec<String>),
}

impl std::fmt::Display for ResyncScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Projects(ids) => write!(f, "{} project(s)", ids.len()),
            Self::All => write!(f, "all"),
            Self::Active => write!(f, "active"),
            Self::Repositories(ids) => write!(f, "{} repository(ies)", ids.len()),
        }
    }
}

/// Options attached to a resync command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncOptions {
    /// Bypass the control plane's skip-if-unchanged optimization.
    pub force: bool,
    /// Flush cache entries for the touched projects as part of the command.
    pub flush_cache: bool,
}

/// One unit of work sent to the control-plane client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResyncCommand {
    pub action: ResyncAction,
    pub scope: ResyncScope,
    pub options: ResyncOptions,
}

impl ResyncCommand {
    pub fn new(action: ResyncAction, scope: ResyncScope) -> Self {
        Self {
            action,
            scope,
            options: ResyncOptions::default(),
        }
    }

    pub fn forced(mut self) -> Self {
        self.options.force = true;
        self
    }

    pub fn flushing_cache(mut self) -> Self {
        self.options.flush_cache = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// The control-plane command queue.
pub trait ResyncClient: Send + Sync {
    /// Issue one command. Fire-and-forget: the core never reads results back.
    fn issue(&self, command: ResyncCommand) -> Result<(), CommandError>;
}

/// Git-hook installation and configuration, both operations idempotent.
pub trait HookManager: Send + Sync {
    /// Verify the hooks are installed for the configured gitolite user,
    /// installing them when they are not.
    fn check_install(&self) -> Result<(), HookError>;

    /// Re-verify and rewrite the generated git-config hook parameters.
    fn verify_config_params(&self) -> Result<(), HookError>;
}

/// The git cache.
pub trait CacheManager: Send + Sync {
    /// Remove entries older than `max_age`. Returns the number removed.
    fn purge_stale(&self, max_age: Duration) -> Result<usize, CacheError>;

    /// Wipe the cache wholesale.
    fn truncate_all(&self) -> Result<(), CacheError>;
}

/// Read access to the project hierarchy.
pub trait ProjectDirectory: Send + Sync {
    /// All projects without a parent. With `include_all_statuses`, closed
    /// and archived roots are returned as well.
    fn root_projects(&self, include_all_statuses: bool) -> Result<Vec<Project>, DirectoryError>;
}

// ---------------------------------------------------------------------------
// Recording double
// ---------------------------------------------------------------------------

/// One observable side effect on the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "effect")]
pub enum ControlPlaneEvent {
    Issued { command: ResyncCommand },
    HookInstallChecked,
    HookParamsVerified,
    CachePurgedStale { max_age_secs: u64 },
    CacheTruncated,
}

/// In-memory control plane that records every effect instead of performing
/// it. Backs the CLI's dry-run plan and the integration tests.
#[derive(Debug, Default)]
pub struct RecordingControlPlane {
    events: Mutex<Vec<ControlPlaneEvent>>,
    roots: Vec<Project>,
}

impl RecordingControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose project directory answers with `roots`.
    pub fn with_root_projects(roots: Vec<Project>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            roots,
        }
    }

    /// Everything recorded so far, in issuance order.
    pub fn events(&self) -> Vec<ControlPlaneEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The resync commands recorded so far, in issuance order.
    pub fn issued_commands(&self) -> Vec<ResyncCommand> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ControlPlaneEvent::Issued { command } => Some(command),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ControlPlaneEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl ResyncClient for RecordingControlPlane {
    fn issue(&self, command: ResyncCommand) -> Result<(), CommandError> {
        self.record(ControlPlaneEvent::Issued { command });
        Ok(())
    }
}

impl HookManager for RecordingControlPlane {
    fn check_install(&self) -> Result<(), HookError> {
        self.record(ControlPlaneEvent::HookInstallChecked);
        Ok(())
    }

    fn verify_config_params(&self) -> Result<(), HookError> {
        self.record(ControlPlaneEvent::HookParamsVerified);
        Ok(())
    }
}

impl CacheManager for RecordingControlPlane {
    fn purge_stale(&self, max_age: Duration) -> Result<usize, CacheError> {
        self.record(ControlPlaneEvent::CachePurgedStale {
            max_age_secs: max_age.as_secs(),
        });
        Ok(0)
    }

    fn truncate_all(&self) -> Result<(), CacheError> {
        self.record(ControlPlaneEvent::CacheTruncated);
        Ok(())
    }
}

impl ProjectDirectory for RecordingControlPlane {
    fn root_projects(&self, _include_all_statuses: bool) -> Result<Vec<Project>, DirectoryError> {
        Ok(self.roots.clone())
    }
}
