//! HTTP handlers for projects, versions, and text/link comments.
//!
//! Mutations persist first, then notify: the fan-out is a side effect of
//! an already-committed write and never rolls it back.

use crate::{
    AppState,
    errors::AppError,
    models::{
        comment::{Comment, CommentType},
        project::Project,
    },
    services::cascade::{delete_comment_with_blobs, delete_project_cascade, delete_version_with_blob},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectReq {
    pub owner_email: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectReq {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentReq {
    pub nickname: String,
    #[serde(rename = "type")]
    pub comment_type: CommentType,
    pub data: String,
}

/// GET `/api/projects` — all projects (or one owner's via `?owner=`),
/// most recently updated first.
pub async fn list_projects(
    State(state): State<AppState>,
    Query(q): Query<ListProjectsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let projects = match q.owner.as_deref() {
        Some(owner) => state.store.list_user_projects(owner).await?,
        None => state.store.list_projects().await?,
    };
    Ok(Json(projects))
}

/// POST `/api/projects`
pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectReq>,
) -> Result<impl IntoResponse, AppError> {
    let project = state
        .store
        .create_project(Project::new(req.owner_email, req.name))
        .await?;
    state.notifier.project_created(&project).await;
    Ok((StatusCode::CREATED, project_response(project)))
}

/// GET `/api/projects/{id}` — body plus the current tag in the `ETag`
/// header, to be presented back via `If-Match` on update.
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let project = require_project(&state, project_id).await?;
    Ok(project_response(project))
}

/// PUT `/api/projects/{id}` — rename under optimistic concurrency.
///
/// Requires `If-Match` with the tag from the last read; a stale tag gets
/// 412 and the client must re-read and retry. Never silently overwrites.
pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<UpdateProjectReq>,
) -> Result<Response, AppError> {
    let expected_tag = if_match_tag(&headers)?;
    let mut project = require_project(&state, project_id).await?;
    if let Some(name) = req.name {
        project.name = name;
    }
    let project = state.store.update_project(project, expected_tag).await?;
    state.notifier.project_updated(&project).await;
    Ok(project_response(project))
}

/// DELETE `/api/projects/{id}` — best-effort cascade.
///
/// Returns the per-step report; 200 even on partial completion (the
/// report says what is left), 404 only when the project never existed.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let project = require_project(&state, project_id).await?;
    let report = delete_project_cascade(&state.store, &state.blobs, &project).await;
    if report.project_deleted {
        state.notifier.project_deleted(project_id).await;
    }
    Ok(Json(report))
}

/// GET `/api/projects/{id}/versions` — newest first.
pub async fn list_versions(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let versions = state.store.list_versions(project_id).await?;
    Ok(Json(versions))
}

/// DELETE `/api/projects/{id}/versions/{n}`
///
/// Reclaims the uploaded blob before removing the row — the blob name is
/// derived from the row, so this is the last moment it is reachable.
/// Idempotent at the storage layer, 404 when the row was already gone.
pub async fn delete_version(
    State(state): State<AppState>,
    Path((project_id, version_number)): Path<(Uuid, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let project = require_project(&state, project_id).await?;
    if delete_version_with_blob(&state.store, &state.blobs, &project, version_number).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!(
            "version {version_number} of project {project_id} not found"
        )))
    }
}

/// GET `/api/projects/{id}/comments` — oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let comments = state.store.list_comments(project_id).await?;
    Ok(Json(comments))
}

/// POST `/api/projects/{id}/comments` — text and link comments.
/// Image comments go through the multipart upload endpoint.
pub async fn create_comment(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateCommentReq>,
) -> Result<impl IntoResponse, AppError> {
    if req.comment_type == CommentType::Image {
        return Err(AppError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "image comments must be uploaded via /comments/image",
        ));
    }
    require_project(&state, project_id).await?;

    let comment = state
        .store
        .allocate_comment(project_id, |stamp| {
            Comment::new(
                project_id,
                stamp,
                req.nickname.clone(),
                req.comment_type,
                req.data.clone(),
            )
        })
        .await?;
    state.notifier.comment_added(&comment).await;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// DELETE `/api/projects/{id}/comments/{createdAtMillis}`
///
/// Image comments reclaim their blobs before the row goes.
pub async fn delete_comment(
    State(state): State<AppState>,
    Path((project_id, created_at_ms)): Path<(Uuid, i64)>,
) -> Result<impl IntoResponse, AppError> {
    if delete_comment_with_blobs(&state.store, &state.blobs, project_id, created_at_ms).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!(
            "comment {created_at_ms} of project {project_id} not found"
        )))
    }
}

/// Resolve a project or 404.
pub(crate) async fn require_project(
    state: &AppState,
    project_id: Uuid,
) -> Result<Project, AppError> {
    state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("project `{project_id}` not found")))
}

/// Parse the `If-Match` header into a version tag.
fn if_match_tag(headers: &HeaderMap) -> Result<Uuid, AppError> {
    headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().trim_matches('"'))
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| {
            AppError::new(
                StatusCode::PRECONDITION_REQUIRED,
                "If-Match header with the tag from the last read is required",
            )
        })
}

/// JSON body plus the entity tag in the `ETag` header.
fn project_response(project: Project) -> Response {
    let etag = format!("\"{}\"", project.etag);
    let mut response = Json(project).into_response();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        response.headers_mut().insert(header::ETAG, value);
    }
    response
}
