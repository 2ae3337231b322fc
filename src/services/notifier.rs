//! src/services/notifier.rs
//!
//! Notifier — maps a domain event to the topics it must reach and pushes
//! the typed payload to the registry's current subscribers. Notification
//! is a side effect of an already-committed write: delivery failures are
//! logged and never roll the mutation back or abort delivery to other
//! subscribers.
//!
//! Routing table:
//!
//! | Event          | Topics                                        |
//! |----------------|-----------------------------------------------|
//! | ProjectCreated | user_{owner}, broadcast-all (refresh signal)  |
//! | ProjectUpdated | project_{id}, user_{owner}, broadcast-all     |
//! | ProjectDeleted | project_{id}, broadcast-all                   |
//! | VersionAdded   | project_{id}                                  |
//! | CommentAdded   | project_{id}                                  |

use crate::hub::protocol::{ProjectEvent, project_topic, user_topic};
use crate::hub::registry::GroupRegistry;
use crate::models::{comment::Comment, project::Project, version::ProjectVersion};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// One delivery target for an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// A single topic, carrying the full event payload.
    Topic(String),
    /// Every connected client; always carries the bare refresh signal.
    All,
}

/// The (target, payload) pairs a domain event expands to.
///
/// Pure function so the routing table is testable without a registry.
/// Broadcast-all rows deliberately drop the entity payload and emit
/// `ProjectListUpdated` instead.
pub fn route(event: &ProjectEvent) -> Vec<(Route, ProjectEvent)> {
    match event {
        ProjectEvent::ProjectCreated(project) => vec![
            (
                Route::Topic(user_topic(&project.owner_email)),
                event.clone(),
            ),
            (Route::All, ProjectEvent::ProjectListUpdated),
        ],
        ProjectEvent::ProjectUpdated(project) => vec![
            (
                Route::Topic(project_topic(project.project_id)),
                event.clone(),
            ),
            (
                Route::Topic(user_topic(&project.owner_email)),
                event.clone(),
            ),
            (Route::All, ProjectEvent::ProjectListUpdated),
        ],
        ProjectEvent::ProjectDeleted(project_id) => vec![
            (Route::Topic(project_topic(*project_id)), event.clone()),
            (Route::All, ProjectEvent::ProjectListUpdated),
        ],
        ProjectEvent::VersionAdded(version) => vec![(
            Route::Topic(project_topic(version.project_id)),
            event.clone(),
        )],
        ProjectEvent::CommentAdded(comment) => vec![(
            Route::Topic(project_topic(comment.project_id)),
            event.clone(),
        )],
        ProjectEvent::ProjectListUpdated => {
            vec![(Route::All, ProjectEvent::ProjectListUpdated)]
        }
    }
}

/// Fan-out component. Holds the injected registry; cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<GroupRegistry>,
}

impl Notifier {
    pub fn new(registry: Arc<GroupRegistry>) -> Self {
        Self { registry }
    }

    pub async fn project_created(&self, project: &Project) {
        self.dispatch(ProjectEvent::ProjectCreated(project.clone()))
            .await;
    }

    pub async fn project_updated(&self, project: &Project) {
        self.dispatch(ProjectEvent::ProjectUpdated(project.clone()))
            .await;
    }

    pub async fn project_deleted(&self, project_id: Uuid) {
        self.dispatch(ProjectEvent::ProjectDeleted(project_id)).await;
    }

    pub async fn version_added(&self, version: &ProjectVersion) {
        self.dispatch(ProjectEvent::VersionAdded(version.clone()))
            .await;
    }

    pub async fn comment_added(&self, comment: &Comment) {
        self.dispatch(ProjectEvent::CommentAdded(comment.clone()))
            .await;
    }

    async fn dispatch(&self, event: ProjectEvent) {
        for (target, payload) in route(&event) {
            let delivered = match &target {
                Route::Topic(topic) => self.registry.send_to_topic(topic, &payload).await,
                Route::All => self.registry.broadcast_all(&payload).await,
            };
            debug!(?target, delivered, "fan-out dispatched");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::comment::CommentType;
    use tokio::sync::mpsc;

    fn sample_project() -> Project {
        Project::new("a@x.com", "Song")
    }

    #[test]
    fn created_goes_to_owner_and_all() {
        let project = sample_project();
        let routes = route(&ProjectEvent::ProjectCreated(project.clone()));
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].0, Route::Topic("user_a@x.com".into()));
        assert_eq!(routes[0].1, ProjectEvent::ProjectCreated(project));
        assert_eq!(routes[1], (Route::All, ProjectEvent::ProjectListUpdated));
    }

    #[test]
    fn updated_goes_to_project_owner_and_all() {
        let project = sample_project();
        let routes = route(&ProjectEvent::ProjectUpdated(project.clone()));
        let targets: Vec<&Route> = routes.iter().map(|(t, _)| t).collect();
        assert_eq!(
            targets,
            [
                &Route::Topic(project_topic(project.project_id)),
                &Route::Topic("user_a@x.com".into()),
                &Route::All,
            ]
        );
        // The entity payload rides the topic routes; broadcast-all only
        // gets the refresh signal.
        assert_eq!(routes[0].1, ProjectEvent::ProjectUpdated(project.clone()));
        assert_eq!(routes[1].1, ProjectEvent::ProjectUpdated(project));
        assert_eq!(routes[2].1, ProjectEvent::ProjectListUpdated);
    }

    #[test]
    fn deleted_goes_to_project_and_all_with_id_payload() {
        let id = Uuid::new_v4();
        let routes = route(&ProjectEvent::ProjectDeleted(id));
        assert_eq!(
            routes[0],
            (
                Route::Topic(project_topic(id)),
                ProjectEvent::ProjectDeleted(id)
            )
        );
        assert_eq!(routes[1], (Route::All, ProjectEvent::ProjectListUpdated));
    }

    #[test]
    fn version_and_comment_stay_on_the_project_topic() {
        let project_id = Uuid::new_v4();
        let version = ProjectVersion::new(project_id, "mix.wav", 100, 10, "audio/wav");
        let routes = route(&ProjectEvent::VersionAdded(version.clone()));
        assert_eq!(
            routes,
            [(
                Route::Topic(project_topic(project_id)),
                ProjectEvent::VersionAdded(version)
            )]
        );

        let comment = Comment::new(project_id, 100, "Ghost#1", CommentType::Text, "nice");
        let routes = route(&ProjectEvent::CommentAdded(comment.clone()));
        assert_eq!(
            routes,
            [(
                Route::Topic(project_topic(project_id)),
                ProjectEvent::CommentAdded(comment)
            )]
        );
    }

    #[tokio::test]
    async fn end_to_end_scenario_matches_the_routing_table() {
        let registry = Arc::new(GroupRegistry::new());
        let notifier = Notifier::new(registry.clone());

        // viewer joined the project topic, owner joined their user topic,
        // bystander connected but joined nothing.
        let viewer = Uuid::new_v4();
        let (viewer_tx, mut viewer_rx) = mpsc::unbounded_channel();
        registry.register(viewer, viewer_tx).await;

        let owner = Uuid::new_v4();
        let (owner_tx, mut owner_rx) = mpsc::unbounded_channel();
        registry.register(owner, owner_tx).await;

        let bystander = Uuid::new_v4();
        let (bystander_tx, mut bystander_rx) = mpsc::unbounded_channel();
        registry.register(bystander, bystander_tx).await;

        let project = Project::new("a@x.com", "Song");
        registry.join(viewer, &project_topic(project.project_id)).await;
        registry.join(owner, &user_topic("a@x.com")).await;

        // Create: owner topic gets the project, everyone gets the refresh.
        notifier.project_created(&project).await;
        assert_eq!(
            owner_rx.recv().await,
            Some(ProjectEvent::ProjectCreated(project.clone()))
        );
        assert_eq!(owner_rx.try_recv().ok(), Some(ProjectEvent::ProjectListUpdated));
        assert_eq!(viewer_rx.try_recv().ok(), Some(ProjectEvent::ProjectListUpdated));
        assert_eq!(
            bystander_rx.try_recv().ok(),
            Some(ProjectEvent::ProjectListUpdated)
        );

        // Comment: only the project topic hears it.
        let comment = Comment::new(
            project.project_id,
            100,
            "Ghost#1",
            CommentType::Text,
            "nice",
        );
        notifier.comment_added(&comment).await;
        assert_eq!(
            viewer_rx.try_recv().ok(),
            Some(ProjectEvent::CommentAdded(comment))
        );
        assert!(owner_rx.try_recv().is_err());
        assert!(bystander_rx.try_recv().is_err());

        // Delete: project topic + refresh; the bystander only sees the refresh.
        notifier.project_deleted(project.project_id).await;
        assert_eq!(
            viewer_rx.try_recv().ok(),
            Some(ProjectEvent::ProjectDeleted(project.project_id))
        );
        assert_eq!(
            viewer_rx.try_recv().ok(),
            Some(ProjectEvent::ProjectListUpdated)
        );
        assert_eq!(
            bystander_rx.try_recv().ok(),
            Some(ProjectEvent::ProjectListUpdated)
        );
        assert!(bystander_rx.try_recv().is_err());
    }
}
