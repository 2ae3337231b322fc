//! Represents a registered user, keyed by the email claim of the
//! authenticated principal.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user account, created on first sign-in.
///
/// Users are never hard-deleted. The nickname is a display name assigned
/// randomly at creation and editable afterwards; comments capture it at
/// post-time rather than referencing it live.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identity key — the email claim supplied by the identity provider.
    pub email: String,

    /// Display name, e.g. "Ghost#4821".
    pub nickname: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Opaque version tag, regenerated on every write.
    pub etag: Uuid,
}

impl User {
    /// Create a fresh user with a randomly assigned nickname.
    pub fn new(email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            email: email.into(),
            nickname: format!("Ghost#{}", rand::rng().random_range(1000..10000)),
            created_at: now,
            updated_at: now,
            etag: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_gets_a_four_digit_nickname() {
        let user = User::new("a@x.com");
        let suffix = user.nickname.strip_prefix("Ghost#").expect("prefix");
        let n: u32 = suffix.parse().expect("numeric suffix");
        assert!((1000..10000).contains(&n));
    }
}
