//! Represents a creative project — the top-level container for versioned
//! uploads and comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A project, owned exclusively by its creator.
///
/// The artwork blob and its thumbnail are always derived together: either
/// both are present or neither is. The thumbnail is always JPEG regardless
/// of the original format.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: Uuid,

    /// Email of the owning user.
    pub owner_email: String,

    pub name: String,

    /// Blob name of the original artwork image, if any.
    pub artwork_blob_name: Option<String>,

    /// Blob name of the derived artwork thumbnail (always `*_thumb.jpg`).
    pub artwork_thumbnail_blob_name: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Opaque version tag, regenerated on every write. Updates must
    /// present the tag from the last read or they are rejected.
    pub etag: Uuid,
}

impl Project {
    pub fn new(owner_email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_id: Uuid::new_v4(),
            owner_email: owner_email.into(),
            name: name.into(),
            artwork_blob_name: None,
            artwork_thumbnail_blob_name: None,
            created_at: now,
            updated_at: now,
            etag: Uuid::new_v4(),
        }
    }
}
