//! Represents one uploaded revision of a project's working file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single immutable version of a project file.
///
/// Identity is `(project_id, version_number)`. Version numbers are
/// millisecond Unix timestamps made strictly monotonic per project by the
/// store, so they double as the ordering key for listings.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectVersion {
    /// Parent project (non-owning reference; cascades are best-effort).
    pub project_id: Uuid,

    /// Original file name as uploaded.
    pub file_name: String,

    /// Millisecond Unix timestamp, unique within the project.
    pub version_number: i64,

    pub file_size_bytes: i64,

    /// Inferred MIME type, e.g. "audio/wav".
    pub file_type: String,

    pub created_at: DateTime<Utc>,

    /// Opaque version tag (versions are immutable; kept for a uniform
    /// row layout across collections).
    pub etag: Uuid,
}

impl ProjectVersion {
    pub fn new(
        project_id: Uuid,
        file_name: impl Into<String>,
        version_number: i64,
        file_size_bytes: i64,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            project_id,
            file_name: file_name.into(),
            version_number,
            file_size_bytes,
            file_type: file_type.into(),
            created_at: Utc::now(),
            etag: Uuid::new_v4(),
        }
    }
}
