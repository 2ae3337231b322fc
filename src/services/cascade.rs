//! Best-effort blob reclamation: the project cascade delete, targeted
//! version/comment deletes, and artwork replacement.
//!
//! Deleting a project, its versions, its comments, and their blobs is an
//! explicit multi-step workflow, not a transaction: each step is
//! independently failable and a failure never resurrects the parent or
//! aborts later steps. The per-step outcome is collected into a report
//! surfaced to the caller, so partial completion is visible instead of
//! hidden behind an opaque boolean. Every child delete is idempotent,
//! which makes retrying a partial cascade safe.
//!
//! The targeted workflows exist because a blob name can only be derived
//! while its metadata row (or project field) still references it: once the
//! row is gone the bytes are unreachable, so blobs are always reclaimed
//! before the reference is dropped.

use crate::models::{comment::CommentType, project::Project};
use crate::services::{
    blob_store::{BlobStore, blob_name},
    entity_store::{EntityStore, StoreResult},
};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

/// Outcome counts for one class of cascade step.
#[derive(Debug, Default, Serialize)]
pub struct StepOutcome {
    pub deleted: usize,
    pub failed: usize,
}

/// Per-step results of a cascade delete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub project_deleted: bool,
    pub versions: StepOutcome,
    pub comments: StepOutcome,
    pub blobs: StepOutcome,
}

impl CascadeReport {
    pub fn complete(&self) -> bool {
        self.project_deleted
            && self.versions.failed == 0
            && self.comments.failed == 0
            && self.blobs.failed == 0
    }
}

/// Delete a project and everything hanging off it, best-effort.
///
/// The caller has already resolved `project` from the store; its fields
/// drive blob name derivation for version files. Returns the report even
/// when the project row itself was already gone (children may still be
/// orphaned from an earlier partial run).
pub async fn delete_project_cascade(
    store: &EntityStore,
    blobs: &BlobStore,
    project: &Project,
) -> CascadeReport {
    let project_id = project.project_id;

    let project_deleted = match store.delete_project(project_id).await {
        Ok(deleted) => deleted,
        Err(err) => {
            warn!(%project_id, "failed to delete project row: {}", err);
            false
        }
    };

    let mut versions = StepOutcome::default();
    let mut comments = StepOutcome::default();
    let mut blob_steps = StepOutcome::default();

    // Version rows and their uploaded files.
    match store.list_versions(project_id).await {
        Ok(rows) => {
            for version in rows {
                let file_blob = blob_name(
                    &project.owner_email,
                    &project.name,
                    version.version_number,
                    &version.file_name,
                );
                delete_blob_step(blobs, &file_blob, &mut blob_steps).await;

                match store.delete_version(project_id, version.version_number).await {
                    Ok(_) => versions.deleted += 1,
                    Err(err) => {
                        warn!(%project_id, version.version_number, "version delete failed: {}", err);
                        versions.failed += 1;
                    }
                }
            }
        }
        Err(err) => {
            warn!(%project_id, "could not enumerate versions: {}", err);
            versions.failed += 1;
        }
    }

    // Comment rows; image comments also reference blobs.
    match store.list_comments(project_id).await {
        Ok(rows) => {
            for comment in rows {
                if comment.comment_type == CommentType::Image {
                    delete_blob_step(blobs, &comment.comment_data, &mut blob_steps).await;
                    if let Some(thumb) = &comment.thumbnail_blob_name {
                        delete_blob_step(blobs, thumb, &mut blob_steps).await;
                    }
                }
                match store.delete_comment(project_id, comment.created_at_ms).await {
                    Ok(_) => comments.deleted += 1,
                    Err(err) => {
                        warn!(%project_id, comment.created_at_ms, "comment delete failed: {}", err);
                        comments.failed += 1;
                    }
                }
            }
        }
        Err(err) => {
            warn!(%project_id, "could not enumerate comments: {}", err);
            comments.failed += 1;
        }
    }

    // Project artwork.
    if let Some(artwork) = &project.artwork_blob_name {
        delete_blob_step(blobs, artwork, &mut blob_steps).await;
    }
    if let Some(thumb) = &project.artwork_thumbnail_blob_name {
        delete_blob_step(blobs, thumb, &mut blob_steps).await;
    }

    CascadeReport {
        project_deleted,
        versions,
        comments,
        blobs: blob_steps,
    }
}

/// Delete one version row, reclaiming its uploaded blob first.
///
/// Returns `false` when the row was already gone. A failed blob delete is
/// logged and the row is removed anyway; the blob stays reachable by name
/// for an operator, which beats a row pointing at bytes we failed to drop.
pub async fn delete_version_with_blob(
    store: &EntityStore,
    blobs: &BlobStore,
    project: &Project,
    version_number: i64,
) -> StoreResult<bool> {
    let Some(version) = store.get_version(project.project_id, version_number).await? else {
        return Ok(false);
    };
    let file_blob = blob_name(
        &project.owner_email,
        &project.name,
        version.version_number,
        &version.file_name,
    );
    reclaim_blob(blobs, &file_blob).await;
    store.delete_version(project.project_id, version_number).await
}

/// Delete one comment row; image comments reclaim their blobs first.
pub async fn delete_comment_with_blobs(
    store: &EntityStore,
    blobs: &BlobStore,
    project_id: Uuid,
    created_at_ms: i64,
) -> StoreResult<bool> {
    let Some(comment) = store.get_comment(project_id, created_at_ms).await? else {
        return Ok(false);
    };
    if comment.comment_type == CommentType::Image {
        reclaim_blob(blobs, &comment.comment_data).await;
        if let Some(thumb) = &comment.thumbnail_blob_name {
            reclaim_blob(blobs, thumb).await;
        }
    }
    store.delete_comment(project_id, created_at_ms).await
}

/// Point a project at freshly stored artwork under its current tag,
/// reclaiming the pair it replaces.
///
/// The caller has already written the new blobs. On a rejected update the
/// new pair is unreachable (nothing references it), so it is reclaimed
/// instead of the old one.
pub async fn swap_artwork(
    store: &EntityStore,
    blobs: &BlobStore,
    mut project: Project,
    original_name: String,
    thumb_name: String,
) -> StoreResult<Project> {
    let expected_tag = project.etag;
    let previous = [
        project.artwork_blob_name.take(),
        project.artwork_thumbnail_blob_name.take(),
    ];
    project.artwork_blob_name = Some(original_name.clone());
    project.artwork_thumbnail_blob_name = Some(thumb_name.clone());

    match store.update_project(project, expected_tag).await {
        Ok(updated) => {
            for name in previous.into_iter().flatten() {
                reclaim_blob(blobs, &name).await;
            }
            Ok(updated)
        }
        Err(err) => {
            reclaim_blob(blobs, &original_name).await;
            reclaim_blob(blobs, &thumb_name).await;
            Err(err)
        }
    }
}

/// Best-effort single blob delete; failures are logged, never surfaced.
pub async fn reclaim_blob(blobs: &BlobStore, name: &str) {
    if let Err(err) = blobs.delete(name).await {
        warn!(name, "blob reclaim failed: {}", err);
    }
}

async fn delete_blob_step(blobs: &BlobStore, name: &str, outcome: &mut StepOutcome) {
    match blobs.delete(name).await {
        // Already-absent blobs count as deleted: the goal state is reached.
        Ok(_) => outcome.deleted += 1,
        Err(err) => {
            warn!(name, "blob delete failed: {}", err);
            outcome.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{comment::Comment, version::ProjectVersion};
    use crate::services::blob_store::thumbnail_name;
    use crate::services::entity_store::StoreError;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

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

    fn test_blobs() -> (BlobStore, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("trackroom-cascade-{}", Uuid::new_v4()));
        (BlobStore::new(&dir, "secret"), dir)
    }

    #[tokio::test]
    async fn cascade_removes_rows_and_blobs() {
        let store = test_store().await;
        let (blobs, dir) = test_blobs();

        let project = store
            .create_project(Project::new("a@x.com", "Song"))
            .await
            .unwrap();
        let id = project.project_id;

        let version = ProjectVersion::new(id, "mix.wav", 100, 7, "audio/wav");
        let file_blob = blob_name("a@x.com", "Song", 100, "mix.wav");
        blobs.put(&file_blob, b"audio").await.unwrap();
        store.create_version(version).await.unwrap();

        store
            .create_comment(Comment::new(id, 200, "Ghost#1", CommentType::Text, "nice"))
            .await
            .unwrap();

        let report = delete_project_cascade(&store, &blobs, &project).await;

        assert!(report.project_deleted);
        assert!(report.complete());
        assert_eq!(report.versions.deleted, 1);
        assert_eq!(report.comments.deleted, 1);
        assert!(store.get_project(id).await.unwrap().is_none());
        assert!(store.list_versions(id).await.unwrap().is_empty());
        assert!(store.list_comments(id).await.unwrap().is_empty());
        assert!(!blobs.exists(&file_blob).await.unwrap());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn deleting_a_version_reclaims_its_blob() {
        let store = test_store().await;
        let (blobs, dir) = test_blobs();

        let project = store
            .create_project(Project::new("a@x.com", "Song"))
            .await
            .unwrap();
        let version = store
            .allocate_version(project.project_id, "mix.wav", 5, "audio/wav")
            .await
            .unwrap();
        let file_blob = blob_name("a@x.com", "Song", version.version_number, "mix.wav");
        blobs.put(&file_blob, b"audio").await.unwrap();

        assert!(
            delete_version_with_blob(&store, &blobs, &project, version.version_number)
                .await
                .unwrap()
        );
        assert!(!blobs.exists(&file_blob).await.unwrap());
        assert!(
            store
                .get_version(project.project_id, version.version_number)
                .await
                .unwrap()
                .is_none()
        );

        // Already gone: reports absence, stays quiet about blobs.
        assert!(
            !delete_version_with_blob(&store, &blobs, &project, version.version_number)
                .await
                .unwrap()
        );

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn deleting_an_image_comment_reclaims_its_blobs() {
        let store = test_store().await;
        let (blobs, dir) = test_blobs();
        let project_id = Uuid::new_v4();

        let original = blob_name("a@x.com", "Song", 100, "cover.png");
        let thumb = thumbnail_name(&original);
        blobs.put(&original, b"png").await.unwrap();
        blobs.put(&thumb, b"jpg").await.unwrap();

        let mut comment =
            Comment::new(project_id, 100, "Ghost#1", CommentType::Image, original.clone());
        comment.thumbnail_blob_name = Some(thumb.clone());
        store.create_comment(comment).await.unwrap();

        assert!(
            delete_comment_with_blobs(&store, &blobs, project_id, 100)
                .await
                .unwrap()
        );
        assert!(!blobs.exists(&original).await.unwrap());
        assert!(!blobs.exists(&thumb).await.unwrap());
        assert!(store.get_comment(project_id, 100).await.unwrap().is_none());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn replacing_artwork_reclaims_the_superseded_pair() {
        let store = test_store().await;
        let (blobs, dir) = test_blobs();

        let project = store
            .create_project(Project::new("a@x.com", "Song"))
            .await
            .unwrap();

        let old_original = blob_name("a@x.com", "Song", 100, "old.png");
        let old_thumb = thumbnail_name(&old_original);
        blobs.put(&old_original, b"old").await.unwrap();
        blobs.put(&old_thumb, b"old-thumb").await.unwrap();
        let project = swap_artwork(
            &store,
            &blobs,
            project,
            old_original.clone(),
            old_thumb.clone(),
        )
        .await
        .unwrap();

        let new_original = blob_name("a@x.com", "Song", 200, "new.png");
        let new_thumb = thumbnail_name(&new_original);
        blobs.put(&new_original, b"new").await.unwrap();
        blobs.put(&new_thumb, b"new-thumb").await.unwrap();
        let project = swap_artwork(
            &store,
            &blobs,
            project,
            new_original.clone(),
            new_thumb.clone(),
        )
        .await
        .unwrap();

        assert_eq!(project.artwork_blob_name.as_deref(), Some(new_original.as_str()));
        assert!(!blobs.exists(&old_original).await.unwrap());
        assert!(!blobs.exists(&old_thumb).await.unwrap());
        assert!(blobs.exists(&new_original).await.unwrap());
        assert!(blobs.exists(&new_thumb).await.unwrap());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn rejected_artwork_swap_reclaims_the_new_pair() {
        let store = test_store().await;
        let (blobs, dir) = test_blobs();

        let project = store
            .create_project(Project::new("a@x.com", "Song"))
            .await
            .unwrap();

        // Another writer moves the tag between our read and the swap.
        let mut renamed = project.clone();
        renamed.name = "Song v2".into();
        store.update_project(renamed, project.etag).await.unwrap();

        let original = blob_name("a@x.com", "Song", 100, "cover.png");
        let thumb = thumbnail_name(&original);
        blobs.put(&original, b"png").await.unwrap();
        blobs.put(&thumb, b"jpg").await.unwrap();

        let err = swap_artwork(&store, &blobs, project, original.clone(), thumb.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
        assert!(!blobs.exists(&original).await.unwrap());
        assert!(!blobs.exists(&thumb).await.unwrap());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn rerunning_a_cascade_is_safe() {
        let store = test_store().await;
        let (blobs, dir) = test_blobs();

        let project = store
            .create_project(Project::new("a@x.com", "Song"))
            .await
            .unwrap();

        let first = delete_project_cascade(&store, &blobs, &project).await;
        assert!(first.project_deleted);

        // Project already gone; children already gone; nothing errors.
        let second = delete_project_cascade(&store, &blobs, &project).await;
        assert!(!second.project_deleted);
        assert_eq!(second.versions.failed, 0);
        assert_eq!(second.comments.failed, 0);
        assert_eq!(second.blobs.failed, 0);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
