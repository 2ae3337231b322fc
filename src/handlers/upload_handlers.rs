//! Multipart upload handlers: project file versions, project artwork,
//! and image comments.
//!
//! Uploads are validated against the extension/size allow-lists before
//! anything is written. Image uploads always produce the original and a
//! derived JPEG thumbnail together under names coupled by the
//! `_thumb.jpg` convention.

use crate::{
    AppState,
    errors::AppError,
    handlers::project_handlers::require_project,
    models::comment::{Comment, CommentType},
    services::{
        blob_store::{blob_name, thumbnail_name},
        cascade::{reclaim_blob, swap_artwork},
        thumbnails::derive_thumbnail,
        validation::{content_type_for, validate_image, validate_upload},
    },
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

/// One file plus the accompanying text fields of a multipart request.
struct UploadForm {
    file_name: String,
    data: Bytes,
    nickname: Option<String>,
}

/// POST `/api/projects/{id}/versions` — upload a new project file version.
pub async fn upload_version(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let project = require_project(&state, project_id).await?;
    let form = read_form(multipart).await?;
    validate_upload(&form.file_name, form.data.len() as i64)?;

    // The row insert reserves the version number; only then is the blob
    // name settled, so racing uploads can never write over each other.
    let version = state
        .store
        .allocate_version(
            project_id,
            &form.file_name,
            form.data.len() as i64,
            content_type_for(&form.file_name),
        )
        .await?;
    let name = blob_name(
        &project.owner_email,
        &project.name,
        version.version_number,
        &form.file_name,
    );
    if let Err(err) = state.blobs.put(&name, &form.data).await {
        // No row may outlive a failed blob write.
        let _ = state
            .store
            .delete_version(project_id, version.version_number)
            .await;
        return Err(err.into());
    }
    state.notifier.version_added(&version).await;
    Ok((StatusCode::CREATED, Json(version)))
}

/// POST `/api/projects/{id}/artwork` — set or replace project artwork.
///
/// Stores the original and the derived thumbnail together, then swaps
/// the project's artwork under its current tag so a concurrent rename is
/// not silently clobbered. The swap reclaims whichever pair ends up
/// unreferenced: the superseded one on success, the new one on a
/// rejected update.
pub async fn upload_artwork(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let project = require_project(&state, project_id).await?;
    let form = read_form(multipart).await?;
    validate_image(&form.file_name, form.data.len() as i64)?;

    let thumbnail = derive_thumbnail(&form.data)?;
    let stamp = Utc::now().timestamp_millis();
    let original_name = blob_name(&project.owner_email, &project.name, stamp, &form.file_name);
    let thumb_name = thumbnail_name(&original_name);

    state.blobs.put(&original_name, &form.data).await?;
    state.blobs.put(&thumb_name, &thumbnail).await?;

    let project =
        swap_artwork(&state.store, &state.blobs, project, original_name, thumb_name).await?;
    state.notifier.project_updated(&project).await;
    Ok(Json(project))
}

/// POST `/api/projects/{id}/comments/image` — post an image comment.
///
/// Requires the authenticated email in `x-user-email` (used for blob
/// naming) and a `nickname` field (captured on the comment).
pub async fn create_image_comment(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let email = headers
        .get("x-user-email")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "missing x-user-email header"))?;

    let project = require_project(&state, project_id).await?;
    let form = read_form(multipart).await?;
    let nickname = form
        .nickname
        .clone()
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "missing `nickname` field"))?;
    validate_image(&form.file_name, form.data.len() as i64)?;

    let thumbnail = derive_thumbnail(&form.data)?;

    // The row insert reserves the stamp, which settles the blob names.
    let comment = state
        .store
        .allocate_comment(project_id, |stamp| {
            let original_name = blob_name(&email, &project.name, stamp, &form.file_name);
            let mut comment = Comment::new(
                project_id,
                stamp,
                nickname.clone(),
                CommentType::Image,
                original_name.clone(),
            );
            comment.thumbnail_blob_name = Some(thumbnail_name(&original_name));
            comment
        })
        .await?;

    let original_name = comment.comment_data.clone();
    let thumb_name = thumbnail_name(&original_name);
    let written = match state.blobs.put(&original_name, &form.data).await {
        Ok(()) => state.blobs.put(&thumb_name, &thumbnail).await,
        Err(err) => Err(err),
    };
    if let Err(err) = written {
        // No row may outlive a failed blob write.
        let _ = state
            .store
            .delete_comment(project_id, comment.created_at_ms)
            .await;
        reclaim_blob(&state.blobs, &original_name).await;
        return Err(err.into());
    }
    state.notifier.comment_added(&comment).await;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Drain a multipart request: exactly one `file` field, plus optional
/// text fields we care about.
async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut nickname = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
                file = Some((file_name, data));
            }
            Some("nickname") => {
                nickname = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "missing `file` field"))?;
    Ok(UploadForm {
        file_name,
        data,
        nickname,
    })
}
