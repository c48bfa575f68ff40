//! gitolite-sync core library.
//!
//! This crate is the decision layer between an application's data store and
//! an external Gitolite control plane: the settings reconciler turns
//! before/after configuration snapshots into resync commands, and the change
//! dispatcher turns entity mutations into per-project resync requests. The
//! actual Gitolite filesystem work lives behind the collaborator traits in
//! [`resync`].

pub mod cache;
pub mod dispatcher;
pub mod errors;
pub mod models;
pub mod reconciler;
pub mod resync;
pub mod settings;

// Re-exports for convenience.
pub use cache::GitCacheStore;
pub use dispatcher::ChangeDispatcher;
pub use errors::CoreError;
pub use reconciler::SettingsReconciler;
pub use settings::{PluginSettings, ReconcileRequest, SettingsSnapshot};
