//! Change dispatcher: translates "this entity just changed" into "these
//! projects need their access-control state regenerated".
//!
//! The persistence layer calls [`ChangeDispatcher::on_entity_changed`] after
//! any create/update/delete of a watched entity. Resolution is pure mapping
//! logic; the only side effect is a single forwarding call into the resync
//! client, with whatever project set was computed — including the empty set.
//! Suppressing a zero-project resync is the control plane's business, not
//! this component's.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{CoreError, ResolutionError};
use crate::models::{ChangedEntity, ProjectId};
use crate::resync::{ResyncAction, ResyncClient, ResyncCommand, ResyncScope};

/// Forwards entity changes as coarse resync requests.
pub struct ChangeDispatcher {
    client: Arc<dyn ResyncClient>,
}

impl ChangeDispatcher {
    pub fn new(client: Arc<dyn ResyncClient>) -> Self {
        Self { client }
    }

    /// React to one entity mutation.
    ///
    /// Resolution failures (dangling associations) propagate to the caller;
    /// nothing is caught or retried here.
    pub fn on_entity_changed(&self, entity: &ChangedEntity) -> Result<(), CoreError> {
        let projects = affected_projects(entity)?;
        debug!(
            entity = entity.kind(),
            projects = projects.len(),
            "entity changed, forwarding resync request"
        );
        self.client.issue(ResyncCommand::new(
            ResyncAction::UpdateProjects,
            ResyncScope::Projects(projects),
        ))?;
        Ok(())
    }
}

/// Resolve a changed entity to the projects whose access-control state it
/// affects.
///
/// Wherever a union is formed (user, public key, role) the result is
/// deduplicated, first occurrence wins.
pub fn affected_projects(entity: &ChangedEntity) -> Result<Vec<ProjectId>, ResolutionError> {
    let projects = match entity {
        ChangedEntity::Project(project) => vec![project.id],

        ChangedEntity::Repository(repository) => {
            let project = repository.project.as_ref().ok_or(
                ResolutionError::DanglingAssociation {
                    entity: "repository",
                    id: repository.id,
                    association: "project",
                },
            )?;
            vec![project.id]
        }

        ChangedEntity::User(user) => dedup(user.projects.iter().map(|p| p.id)),

        ChangedEntity::PublicKey(key) => {
            let user = key
                .user
                .as_ref()
                .ok_or(ResolutionError::DanglingAssociation {
                    entity: "public_key",
                    id: key.id,
                    association: "user",
                })?;
            dedup(user.projects.iter().map(|p| p.id))
        }

        ChangedEntity::Member(member) => vec![member.project.id],

        ChangedEntity::Role(role) => dedup(role.members.iter().map(|m| m.project.id)),
    };
    Ok(projects)
}

fn dedup(ids: impl Iterator<Item = ProjectId>) -> Vec<ProjectId> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Member, Project, ProjectStatus, PublicKey, Repository, Role, User};
    use crate::resync::RecordingControlPlane;

    fn project(id: i64) -> Project {
        Project {
            id: ProjectId(id),
            identifier: format!("project-{id}"),
            parent_id: None,
            status: ProjectStatus::Active,
        }
    }

    fn member(id: i64, project_id: i64) -> Member {
        Member {
            id,
            user_id: 100 + id,
            project: project(project_id),
        }
    }

    #[test]
    fn test_project_resolves_to_itself() {
        let entity = ChangedEntity::Project(project(7));
        assert_eq!(affected_projects(&entity).unwrap(), vec![ProjectId(7)]);
    }

    #[test]
    fn test_repository_resolves_to_owning_project() {
        let entity = ChangedEntity::Repository(Repository {
            id: 1,
            project: Some(project(3)),
        });
        assert_eq!(affected_projects(&entity).unwrap(), vec![ProjectId(3)]);
    }

    #[test]
    fn test_dangling_repository_is_a_resolution_error() {
        let entity = ChangedEntity::Repository(Repository {
            id: 9,
            project: None,
        });
        let err = affected_projects(&entity).unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::DanglingAssociation {
                entity: "repository",
                id: 9,
                ..
            }
        ));
    }

    #[test]
    fn test_role_members_deduplicate_projects() {
        let entity = ChangedEntity::Role(Role {
            id: 1,
            name: "developer".into(),
            members: vec![member(1, 1), member(2, 2), member(3, 1)],
        });
        assert_eq!(
            affected_projects(&entity).unwrap(),
            vec![ProjectId(1), ProjectId(2)]
        );
    }

    #[test]
    fn test_public_key_resolves_through_owner() {
        let entity = ChangedEntity::PublicKey(PublicKey {
            id: 4,
            title: "laptop".into(),
            user: Some(User {
                id: 2,
                login: "alice".into(),
                projects: vec![project(1), project(1), project(5)],
            }),
        });
        assert_eq!(
            affected_projects(&entity).unwrap(),
            vec![ProjectId(1), ProjectId(5)]
        );
    }

    #[test]
    fn test_key_without_user_is_a_resolution_error() {
        let entity = ChangedEntity::PublicKey(PublicKey {
            id: 4,
            title: "orphan".into(),
            user: None,
        });
        assert!(affected_projects(&entity).is_err());
    }

    #[test]
    fn test_user_with_no_memberships_forwards_empty_set() {
        let plane = Arc::new(RecordingControlPlane::new());
        let dispatcher = ChangeDispatcher::new(plane.clone());

        let entity = ChangedEntity::User(User {
            id: 8,
            login: "newcomer".into(),
            projects: vec![],
        });
        dispatcher.on_entity_changed(&entity).unwrap();

        // The empty set is forwarded, not swallowed.
        let commands = plane.issued_commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action, ResyncAction::UpdateProjects);
        assert_eq!(commands[0].scope, ResyncScope::Projects(vec![]));
    }

    #[test]
    fn test_member_change_forwards_exactly_one_command() {
        let plane = Arc::new(RecordingControlPlane::new());
        let dispatcher = ChangeDispatcher::new(plane.clone());

        dispatcher
            .on_entity_changed(&ChangedEntity::Member(member(1, 42)))
            .unwrap();

        let commands = plane.issued_commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].scope,
            ResyncScope::Projects(vec![ProjectId(42)])
        );
    }
}
