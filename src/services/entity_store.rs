//! src/services/entity_store.rs
//!
//! EntityStore — typed key-value access to the four entity collections
//! (users, projects, versions, comments) backed by SQLite. Every row
//! carries an opaque `etag`; the update path requires the tag obtained
//! from the last read and rejects stale tags instead of overwriting.
//!
//! Reads return `Option` and never error on absence. Deletes return
//! `false` on absence and never error, which makes retrying a partially
//! completed cascade safe.

use crate::models::{
    comment::Comment, project::Project, user::User, version::ProjectVersion,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} `{key}` already exists")]
    AlreadyExists { kind: &'static str, key: String },
    #[error("{kind} `{key}` not found")]
    NotFound { kind: &'static str, key: String },
    #[error("{kind} `{key}` was modified since last read")]
    ConcurrencyConflict { kind: &'static str, key: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Attempts before an allocate-insert loop gives up. Each failed attempt
/// means another writer won the stamp, so exhaustion signals sustained
/// contention rather than a transient race.
const STAMP_RETRY_LIMIT: usize = 8;

/// Typed store over the four entity tables.
///
/// The required listing orders live here rather than in SQL `ORDER BY`
/// clauses where the sort key is not a plain integer column: the store
/// itself guarantees no ordering, so each listing method sorts before
/// returning.
#[derive(Clone)]
pub struct EntityStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl EntityStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    // --- Users ---

    pub async fn get_user(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT email, nickname, created_at, updated_at, etag
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    /// Create or fully replace a user. No tag check; refreshes
    /// `updated_at` and regenerates the tag.
    pub async fn upsert_user(&self, mut user: User) -> StoreResult<User> {
        user.updated_at = Utc::now();
        user.etag = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (email, nickname, created_at, updated_at, etag)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET
                nickname = excluded.nickname,
                updated_at = excluded.updated_at,
                etag = excluded.etag",
        )
        .bind(&user.email)
        .bind(&user.nickname)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.etag)
        .execute(&*self.db)
        .await?;
        Ok(user)
    }

    /// All users, nickname ascending.
    pub async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users = sqlx::query_as::<_, User>(
            "SELECT email, nickname, created_at, updated_at, etag FROM users",
        )
        .fetch_all(&*self.db)
        .await?;
        users.sort_by(|a, b| a.nickname.cmp(&b.nickname));
        Ok(users)
    }

    // --- Projects ---

    pub async fn get_project(&self, project_id: Uuid) -> StoreResult<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT project_id, owner_email, name, artwork_blob_name,
                    artwork_thumbnail_blob_name, created_at, updated_at, etag
             FROM projects WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(project)
    }

    pub async fn create_project(&self, project: Project) -> StoreResult<Project> {
        let result = sqlx::query(
            "INSERT INTO projects (project_id, owner_email, name, artwork_blob_name,
                                   artwork_thumbnail_blob_name, created_at, updated_at, etag)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project.project_id)
        .bind(&project.owner_email)
        .bind(&project.name)
        .bind(&project.artwork_blob_name)
        .bind(&project.artwork_thumbnail_blob_name)
        .bind(project.created_at)
        .bind(project.updated_at)
        .bind(project.etag)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(project),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyExists {
                kind: "project",
                key: project.project_id.to_string(),
            }),
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// Update a project under optimistic concurrency.
    ///
    /// The stored tag must equal `expected_tag` or the write is rejected
    /// with `ConcurrencyConflict` — the caller re-reads and retries.
    /// Refreshes `updated_at` and regenerates the tag on success.
    pub async fn update_project(
        &self,
        mut project: Project,
        expected_tag: Uuid,
    ) -> StoreResult<Project> {
        project.updated_at = Utc::now();
        project.etag = Uuid::new_v4();
        let result = sqlx::query(
            "UPDATE projects SET owner_email = ?, name = ?, artwork_blob_name = ?,
                    artwork_thumbnail_blob_name = ?, updated_at = ?, etag = ?
             WHERE project_id = ? AND etag = ?",
        )
        .bind(&project.owner_email)
        .bind(&project.name)
        .bind(&project.artwork_blob_name)
        .bind(&project.artwork_thumbnail_blob_name)
        .bind(project.updated_at)
        .bind(project.etag)
        .bind(project.project_id)
        .bind(expected_tag)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return if self.get_project(project.project_id).await?.is_some() {
                Err(StoreError::ConcurrencyConflict {
                    kind: "project",
                    key: project.project_id.to_string(),
                })
            } else {
                Err(StoreError::NotFound {
                    kind: "project",
                    key: project.project_id.to_string(),
                })
            };
        }
        Ok(project)
    }

    /// Delete a project row. Returns `false` if it was already gone.
    pub async fn delete_project(&self, project_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE project_id = ?")
            .bind(project_id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All projects, most recently updated first.
    pub async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let mut projects = sqlx::query_as::<_, Project>(
            "SELECT project_id, owner_email, name, artwork_blob_name,
                    artwork_thumbnail_blob_name, created_at, updated_at, etag
             FROM projects",
        )
        .fetch_all(&*self.db)
        .await?;
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    /// One owner's projects, most recently updated first.
    pub async fn list_user_projects(&self, owner_email: &str) -> StoreResult<Vec<Project>> {
        let mut projects = sqlx::query_as::<_, Project>(
            "SELECT project_id, owner_email, name, artwork_blob_name,
                    artwork_thumbnail_blob_name, created_at, updated_at, etag
             FROM projects WHERE owner_email = ?",
        )
        .bind(owner_email)
        .fetch_all(&*self.db)
        .await?;
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    // --- Versions ---

    /// Insert a new version under a freshly allocated version number.
    ///
    /// Allocation is not a separate step the caller can race on: the
    /// candidate stamp is only held once the insert lands, and the
    /// `(project_id, version_number)` primary key is the serialization
    /// point. A writer that loses the race re-reads the latest stamp and
    /// bumps past it.
    pub async fn allocate_version(
        &self,
        project_id: Uuid,
        file_name: &str,
        file_size_bytes: i64,
        file_type: &str,
    ) -> StoreResult<ProjectVersion> {
        for _ in 0..STAMP_RETRY_LIMIT {
            let number = self.next_version_number(project_id).await?;
            let candidate =
                ProjectVersion::new(project_id, file_name, number, file_size_bytes, file_type);
            match self.create_version(candidate).await {
                Err(StoreError::AlreadyExists { .. }) => continue,
                other => return other,
            }
        }
        Err(StoreError::ConcurrencyConflict {
            kind: "version",
            key: project_id.to_string(),
        })
    }

    /// Candidate version number: millisecond wall-clock, bumped past the
    /// latest existing number. Only `allocate_version` may act on it.
    async fn next_version_number(&self, project_id: Uuid) -> StoreResult<i64> {
        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version_number) FROM project_versions WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_one(&*self.db)
        .await?;
        Ok(next_stamp(latest))
    }

    pub async fn create_version(&self, version: ProjectVersion) -> StoreResult<ProjectVersion> {
        let result = sqlx::query(
            "INSERT INTO project_versions (project_id, version_number, file_name,
                                           file_size_bytes, file_type, created_at, etag)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(version.project_id)
        .bind(version.version_number)
        .bind(&version.file_name)
        .bind(version.file_size_bytes)
        .bind(&version.file_type)
        .bind(version.created_at)
        .bind(version.etag)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(version),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyExists {
                kind: "version",
                key: format!("{}-{}", version.project_id, version.version_number),
            }),
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// A project's versions, newest version number first.
    pub async fn list_versions(&self, project_id: Uuid) -> StoreResult<Vec<ProjectVersion>> {
        let versions = sqlx::query_as::<_, ProjectVersion>(
            "SELECT project_id, version_number, file_name, file_size_bytes,
                    file_type, created_at, etag
             FROM project_versions WHERE project_id = ?
             ORDER BY version_number DESC",
        )
        .bind(project_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(versions)
    }

    pub async fn get_version(
        &self,
        project_id: Uuid,
        version_number: i64,
    ) -> StoreResult<Option<ProjectVersion>> {
        let version = sqlx::query_as::<_, ProjectVersion>(
            "SELECT project_id, version_number, file_name, file_size_bytes,
                    file_type, created_at, etag
             FROM project_versions WHERE project_id = ? AND version_number = ?",
        )
        .bind(project_id)
        .bind(version_number)
        .fetch_optional(&*self.db)
        .await?;
        Ok(version)
    }

    pub async fn latest_version(&self, project_id: Uuid) -> StoreResult<Option<ProjectVersion>> {
        let version = sqlx::query_as::<_, ProjectVersion>(
            "SELECT project_id, version_number, file_name, file_size_bytes,
                    file_type, created_at, etag
             FROM project_versions WHERE project_id = ?
             ORDER BY version_number DESC LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(version)
    }

    pub async fn delete_version(&self, project_id: Uuid, version_number: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM project_versions WHERE project_id = ? AND version_number = ?",
        )
        .bind(project_id)
        .bind(version_number)
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- Comments ---

    /// Insert a new comment under a freshly allocated identity stamp.
    ///
    /// `build` constructs the comment from the candidate stamp; it may be
    /// called more than once when the insert loses a race on the
    /// `(project_id, created_at_ms)` key. Same contract as
    /// `allocate_version`: the stamp is only held once the insert lands.
    pub async fn allocate_comment(
        &self,
        project_id: Uuid,
        build: impl Fn(i64) -> Comment,
    ) -> StoreResult<Comment> {
        for _ in 0..STAMP_RETRY_LIMIT {
            let stamp = self.next_comment_stamp(project_id).await?;
            match self.create_comment(build(stamp)).await {
                Err(StoreError::AlreadyExists { .. }) => continue,
                other => return other,
            }
        }
        Err(StoreError::ConcurrencyConflict {
            kind: "comment",
            key: project_id.to_string(),
        })
    }

    /// Candidate identity stamp for a new comment on a project.
    async fn next_comment_stamp(&self, project_id: Uuid) -> StoreResult<i64> {
        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(created_at_ms) FROM comments WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_one(&*self.db)
        .await?;
        Ok(next_stamp(latest))
    }

    pub async fn create_comment(&self, comment: Comment) -> StoreResult<Comment> {
        let result = sqlx::query(
            "INSERT INTO comments (project_id, created_at_ms, nickname, comment_type,
                                   comment_data, thumbnail_blob_name, created_at, etag)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(comment.project_id)
        .bind(comment.created_at_ms)
        .bind(&comment.nickname)
        .bind(comment.comment_type)
        .bind(&comment.comment_data)
        .bind(&comment.thumbnail_blob_name)
        .bind(comment.created_at)
        .bind(comment.etag)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(comment),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyExists {
                kind: "comment",
                key: format!("{}-{}", comment.project_id, comment.created_at_ms),
            }),
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    pub async fn get_comment(
        &self,
        project_id: Uuid,
        created_at_ms: i64,
    ) -> StoreResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT project_id, created_at_ms, nickname, comment_type, comment_data,
                    thumbnail_blob_name, created_at, etag
             FROM comments WHERE project_id = ? AND created_at_ms = ?",
        )
        .bind(project_id)
        .bind(created_at_ms)
        .fetch_optional(&*self.db)
        .await?;
        Ok(comment)
    }

    /// A project's comments, oldest first.
    pub async fn list_comments(&self, project_id: Uuid) -> StoreResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT project_id, created_at_ms, nickname, comment_type, comment_data,
                    thumbnail_blob_name, created_at, etag
             FROM comments WHERE project_id = ?
             ORDER BY created_at_ms ASC",
        )
        .bind(project_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(comments)
    }

    pub async fn delete_comment(&self, project_id: Uuid, created_at_ms: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM comments WHERE project_id = ? AND created_at_ms = ?",
        )
        .bind(project_id)
        .bind(created_at_ms)
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Millisecond stamp strictly greater than any existing one.
fn next_stamp(latest: Option<i64>) -> i64 {
    let now = Utc::now().timestamp_millis();
    match latest {
        Some(prev) if prev >= now => prev + 1,
        _ => now,
    }
}

/// Return true if the SQLx error indicates a unique/primary-key violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::comment::CommentType;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> EntityStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let sql = include_str!("../../migrations/0001_init.sql");
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&pool).await.expect("migration");
        }
        EntityStore::new(Arc::new(pool))
    }

    #[tokio::test]
    async fn get_absent_user_returns_none() {
        let store = test_store().await;
        assert!(store.get_user("nobody@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_user_refreshes_tag_and_timestamp() {
        let store = test_store().await;
        let user = store.upsert_user(User::new("a@x.com")).await.unwrap();
        let first_tag = user.etag;

        let again = store.upsert_user(user).await.unwrap();
        assert_ne!(again.etag, first_tag);
        assert!(again.updated_at >= again.created_at);
    }

    #[tokio::test]
    async fn users_list_by_nickname_ascending() {
        let store = test_store().await;
        for (email, nick) in [("a@x.com", "zed"), ("b@x.com", "amy"), ("c@x.com", "mia")] {
            let mut user = User::new(email);
            user.nickname = nick.to_string();
            store.upsert_user(user).await.unwrap();
        }
        let nicks: Vec<String> = store
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.nickname)
            .collect();
        assert_eq!(nicks, ["amy", "mia", "zed"]);
    }

    #[tokio::test]
    async fn create_project_twice_is_already_exists() {
        let store = test_store().await;
        let project = store
            .create_project(Project::new("a@x.com", "Song"))
            .await
            .unwrap();
        let err = store.create_project(project).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { kind: "project", .. }));
    }

    #[tokio::test]
    async fn update_with_stale_tag_is_rejected() {
        let store = test_store().await;
        let project = store
            .create_project(Project::new("a@x.com", "Song"))
            .await
            .unwrap();
        let stale = project.etag;

        let mut renamed = project.clone();
        renamed.name = "Song v2".into();
        let updated = store.update_project(renamed, stale).await.unwrap();
        assert_ne!(updated.etag, stale, "tag must change on every write");

        // The old tag is now stale and must be rejected.
        let mut again = updated.clone();
        again.name = "Song v3".into();
        let err = store.update_project(again, stale).await.unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));

        // The stored row still carries the accepted name.
        let current = store.get_project(project.project_id).await.unwrap().unwrap();
        assert_eq!(current.name, "Song v2");
    }

    #[tokio::test]
    async fn update_absent_project_is_not_found() {
        let store = test_store().await;
        let ghost = Project::new("a@x.com", "Gone");
        let err = store.update_project(ghost.clone(), ghost.etag).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_project_is_idempotent() {
        let store = test_store().await;
        let project = store
            .create_project(Project::new("a@x.com", "Song"))
            .await
            .unwrap();
        assert!(store.delete_project(project.project_id).await.unwrap());
        assert!(!store.delete_project(project.project_id).await.unwrap());
    }

    #[tokio::test]
    async fn versions_list_newest_first() {
        let store = test_store().await;
        let project_id = Uuid::new_v4();
        for n in [100, 200, 150] {
            store
                .create_version(ProjectVersion::new(project_id, "mix.wav", n, 10, "audio/wav"))
                .await
                .unwrap();
        }
        let numbers: Vec<i64> = store
            .list_versions(project_id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, [200, 150, 100]);

        let latest = store.latest_version(project_id).await.unwrap().unwrap();
        assert_eq!(latest.version_number, 200);
    }

    #[tokio::test]
    async fn duplicate_version_number_is_already_exists() {
        let store = test_store().await;
        let project_id = Uuid::new_v4();
        let v = ProjectVersion::new(project_id, "mix.wav", 100, 10, "audio/wav");
        store.create_version(v.clone()).await.unwrap();
        let err = store.create_version(v).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { kind: "version", .. }));
    }

    #[tokio::test]
    async fn allocated_stamps_never_collide() {
        let store = test_store().await;
        let project_id = Uuid::new_v4();
        let first = store
            .allocate_version(project_id, "a.wav", 1, "audio/wav")
            .await
            .unwrap();
        let second = store
            .allocate_version(project_id, "b.wav", 1, "audio/wav")
            .await
            .unwrap();
        assert!(second.version_number > first.version_number);
    }

    #[tokio::test]
    async fn racing_version_allocations_get_distinct_stamps() {
        let store = test_store().await;
        let project_id = Uuid::new_v4();

        // Seed far in the future so every allocation hits the bump path,
        // where racing writers would otherwise compute the same candidate.
        let seed = Utc::now().timestamp_millis() + 1_000_000;
        store
            .create_version(ProjectVersion::new(project_id, "seed.wav", seed, 1, "audio/wav"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for n in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .allocate_version(project_id, &format!("take{n}.wav"), 1, "audio/wav")
                    .await
                    .unwrap()
                    .version_number
            }));
        }
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), 4, "every writer must hold a distinct stamp");
        assert!(numbers.iter().all(|n| *n > seed));
    }

    #[tokio::test]
    async fn racing_comment_allocations_get_distinct_stamps() {
        let store = test_store().await;
        let project_id = Uuid::new_v4();
        let seed = Utc::now().timestamp_millis() + 1_000_000;
        store
            .create_comment(Comment::new(project_id, seed, "Ghost#1", CommentType::Text, "seed"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for n in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .allocate_comment(project_id, |stamp| {
                        Comment::new(
                            project_id,
                            stamp,
                            "Ghost#1",
                            CommentType::Text,
                            format!("reply {n}"),
                        )
                    })
                    .await
                    .unwrap()
                    .created_at_ms
            }));
        }
        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort_unstable();
        stamps.dedup();
        assert_eq!(stamps.len(), 4);
        assert!(stamps.iter().all(|s| *s > seed));
    }

    #[tokio::test]
    async fn comments_list_oldest_first() {
        let store = test_store().await;
        let project_id = Uuid::new_v4();
        for (ms, text) in [(300, "third"), (100, "first"), (200, "second")] {
            store
                .create_comment(Comment::new(project_id, ms, "Ghost#1", CommentType::Text, text))
                .await
                .unwrap();
        }
        let texts: Vec<String> = store
            .list_comments(project_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.comment_data)
            .collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn delete_comment_absent_returns_false() {
        let store = test_store().await;
        assert!(!store.delete_comment(Uuid::new_v4(), 123).await.unwrap());
    }

    #[test]
    fn next_stamp_bumps_past_existing() {
        let far_future = Utc::now().timestamp_millis() + 1_000_000;
        assert_eq!(next_stamp(Some(far_future)), far_future + 1);
        assert!(next_stamp(None) > 0);
    }
}
