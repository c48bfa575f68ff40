//! Domain model types mirrored from the host application's data store.
//!
//! These are read-only denormalized views: each entity carries exactly the
//! relational context the change dispatcher needs to resolve it to a set of
//! affected projects, so that no live database handle is required at
//! dispatch time.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// Opaque project identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Closed,
    Archived,
}

/// A project as seen by the reconciliation core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// URL-safe identifier, also the repository directory name.
    pub identifier: String,
    pub parent_id: Option<ProjectId>,
    pub status: ProjectStatus,
}

impl Project {
    /// Whether this project sits at the top of the hierarchy.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

// ---------------------------------------------------------------------------
// Access-control entities
// ---------------------------------------------------------------------------

/// A managed git repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    /// Owning project, `None` when the association dangles.
    pub project: Option<Project>,
}

/// An application user together with the projects it is a member of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub projects: Vec<Project>,
}

/// An SSH public key owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicKey {
    pub id: i64,
    pub title: String,
    /// Owning user, `None` when the association dangles.
    pub user: Option<User>,
}

/// A single membership record binding one user to one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub user_id: i64,
    pub project: Project,
}

/// A role together with every membership that holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub members: Vec<Member>,
}

// ---------------------------------------------------------------------------
// Changed entity
// ---------------------------------------------------------------------------

/// A watched entity that was just created, updated, or destroyed.
///
/// One variant per entity type participating in access control; the
/// dispatcher selects the resolution rule with an explicit match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangedEntity {
    Project(Project),
    Repository(Repository),
    User(User),
    PublicKey(PublicKey),
    Member(Member),
    Role(Role),
}

impl ChangedEntity {
    /// Lowercase entity kind, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Repository(_) => "repository",
            Self::User(_) => "user",
            Self::PublicKey(_) => "public_key",
            Self::Member(_) => "member",
            Self::Role(_) => "role",
        }
    }
}
