//! Blob download handlers.
//!
//! Reads go through time-limited signed URLs: a client first asks for a
//! URL, then fetches the payload with the signature attached. Payloads
//! stream from disk rather than buffering in memory.

use crate::{AppState, errors::AppError, services::validation::content_type_for};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_util::io::ReaderStream;

const DEFAULT_URL_EXPIRY_SECS: u64 = 3600;

/// Query params carried by a signed URL.
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub sig: String,
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    /// Seconds until the minted URL expires; defaults to one hour.
    pub expiry_secs: Option<u64>,
}

/// GET `/files/{name}?expires=&sig=` — stream a blob after verifying the
/// signature and expiry.
pub async fn get_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<SignedQuery>,
) -> Result<Response, AppError> {
    if !state.blobs.verify(&name, q.expires, &q.sig) {
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            "signature invalid or expired",
        ));
    }

    let file = state
        .blobs
        .open(&name)
        .await?
        .ok_or_else(|| AppError::not_found(format!("blob `{name}` not found")))?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&name)),
    );
    Ok(response)
}

/// GET `/api/files/{name}/url` — mint a signed, time-limited read URL.
pub async fn file_url(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<UrlQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !state.blobs.exists(&name).await? {
        return Err(AppError::not_found(format!("blob `{name}` not found")));
    }
    let expiry = Duration::from_secs(q.expiry_secs.unwrap_or(DEFAULT_URL_EXPIRY_SECS));
    Ok(Json(json!({ "url": state.blobs.signed_url(&name, expiry) })))
}
