//! Wire contract for the client subscription protocol.
//!
//! Clients hold one shared connection, send `join`/`leave` commands for
//! the topics they care about, and receive typed event payloads. Events
//! are a discriminated union so no stringly-typed event name leaks past
//! the transport boundary. Membership is in-memory only: after a
//! reconnect a client must re-issue `join` for every topic it still
//! cares about.

use crate::models::{comment::Comment, project::Project, version::ProjectVersion};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic for everyone viewing one project.
pub fn project_topic(project_id: Uuid) -> String {
    format!("project_{project_id}")
}

/// Topic for one user's personal notifications.
pub fn user_topic(email: &str) -> String {
    format!("user_{email}")
}

/// Command sent by a client over the transport.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientCommand {
    Join { topic: String },
    Leave { topic: String },
}

/// Event pushed to subscribed clients.
///
/// `ProjectListUpdated` carries no entity payload; it only signals that
/// the global project list should be refreshed, so clients need not hold
/// full list state.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum ProjectEvent {
    ProjectCreated(Project),
    ProjectUpdated(Project),
    ProjectDeleted(Uuid),
    VersionAdded(ProjectVersion),
    CommentAdded(Comment),
    ProjectListUpdated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_tagged_json() {
        let join: ClientCommand =
            serde_json::from_str(r#"{"action":"join","topic":"project_abc"}"#).expect("parse");
        assert_eq!(
            join,
            ClientCommand::Join {
                topic: "project_abc".into()
            }
        );

        let leave: ClientCommand =
            serde_json::from_str(r#"{"action":"leave","topic":"user_a@x.com"}"#).expect("parse");
        assert_eq!(
            leave,
            ClientCommand::Leave {
                topic: "user_a@x.com".into()
            }
        );
    }

    #[test]
    fn unknown_actions_are_rejected() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"action":"shout"}"#).is_err());
    }

    #[test]
    fn deleted_event_carries_only_the_project_id() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ProjectEvent::ProjectDeleted(id)).expect("serialize");
        assert_eq!(json["event"], "ProjectDeleted");
        assert_eq!(json["payload"], serde_json::json!(id));
    }

    #[test]
    fn list_updated_event_has_no_payload() {
        let json = serde_json::to_value(ProjectEvent::ProjectListUpdated).expect("serialize");
        assert_eq!(json["event"], "ProjectListUpdated");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn topics_carry_their_type_prefix() {
        let id = Uuid::new_v4();
        assert_eq!(project_topic(id), format!("project_{id}"));
        assert_eq!(user_topic("a@x.com"), "user_a@x.com");
    }
}
