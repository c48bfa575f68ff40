//! Error types for the gitolite-sync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

// ---------------------------------------------------------------------------
// Entity resolution errors
// ---------------------------------------------------------------------------

/// Errors from resolving a changed entity to its affected projects.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// An association required for resolution is missing, e.g. a repository
    /// whose owning project row has been deleted underneath it.
    #[error("{entity} {id} has no {association} to resolve against")]
    DanglingAssociation {
        entity: &'static str,
        id: i64,
        association: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Control-plane command errors
// ---------------------------------------------------------------------------

/// Errors from issuing a resync command to the control-plane client.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The control plane rejected the command outright.
    #[error("resync command '{action}' rejected: {detail}")]
    Rejected {
        action: String,
        detail: String,
    },

    /// Transport / backend failure while handing the command over.
    #[error("control-plane backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Hook management errors
// ---------------------------------------------------------------------------

/// Errors from the git-hook management collaborator.
#[derive(Debug, Error)]
pub enum HookError {
    /// Hook installation check or repair failed.
    #[error("hook installation failed for user '{user}': {detail}")]
    InstallFailed {
        user: String,
        detail: String,
    },

    /// The generated git-config hook parameters could not be written.
    #[error("hook config update failed: {0}")]
    ConfigUpdateFailed(String),
}

// ---------------------------------------------------------------------------
// Cache errors
// ---------------------------------------------------------------------------

/// Errors from the git-cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// An underlying SQLite error.
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be interpreted (e.g. a bad timestamp).
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

// ---------------------------------------------------------------------------
// Project directory errors
// ---------------------------------------------------------------------------

/// Errors from reading the project hierarchy.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The backing store could not be queried.
    #[error("project directory error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Settings errors
// ---------------------------------------------------------------------------

/// Errors from loading and serializing plugin settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file not found.
    #[error("settings file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("settings parse error: {0}")]
    Parse(String),

    /// TOML serialization error.
    #[error("settings serialization error: {0}")]
    Serialize(String),

    /// Generic I/O wrapper.
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

/// A single failed reconciliation check.
///
/// The check name is the reconciler's own identifier for the check, e.g.
/// `repo_hierarchy` or `flush_cache`.
#[derive(Debug, Error)]
#[error("{check}: {source}")]
pub struct CheckFailure {
    pub check: &'static str,
    pub source: CoreError,
}

/// Outcome of a reconciliation call in which one or more checks failed.
///
/// The reconciler never stops at the first failure: every check in the
/// battery runs, and the failures are aggregated here.
#[derive(Debug, Error)]
#[error("{} reconciliation check(s) failed: {}", .failures.len(), join_failures(.failures))]
pub struct ReconcileError {
    pub failures: Vec<CheckFailure>,
}

fn join_failures(failures: &[CheckFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
