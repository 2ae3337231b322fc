//! Represents a threaded comment on a project.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of comment payload.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CommentType {
    Text,
    Image,
    Link,
}

/// An immutable comment.
///
/// Identity is `(project_id, created_at_ms)` where the timestamp is made
/// strictly monotonic per project by the store. The author nickname is
/// captured at post-time, not a live reference to the user row. For image
/// comments `comment_data` holds the original blob name and
/// `thumbnail_blob_name` the derived JPEG thumbnail.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub project_id: Uuid,

    /// Millisecond Unix timestamp, part of the identity key.
    pub created_at_ms: i64,

    pub nickname: String,

    #[serde(rename = "type")]
    pub comment_type: CommentType,

    /// Text/link payload, or the original image blob name.
    pub comment_data: String,

    pub thumbnail_blob_name: Option<String>,

    pub created_at: DateTime<Utc>,

    pub etag: Uuid,
}

impl Comment {
    pub fn new(
        project_id: Uuid,
        created_at_ms: i64,
        nickname: impl Into<String>,
        comment_type: CommentType,
        comment_data: impl Into<String>,
    ) -> Self {
        let created_at = Utc
            .timestamp_millis_opt(created_at_ms)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            project_id,
            created_at_ms,
            nickname: nickname.into(),
            comment_type,
            comment_data: comment_data.into(),
            thumbnail_blob_name: None,
            created_at,
            etag: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_type_serializes_lowercase() {
        let json = serde_json::to_string(&CommentType::Image).expect("serialize");
        assert_eq!(json, "\"image\"");
    }

    #[test]
    fn created_at_tracks_the_identity_stamp() {
        let c = Comment::new(Uuid::new_v4(), 1_700_000_000_123, "Ghost#1", CommentType::Text, "hi");
        assert_eq!(c.created_at.timestamp_millis(), 1_700_000_000_123);
    }
}
