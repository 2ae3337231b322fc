//! Route table for the project-sharing API.
//!
//! ## Structure
//! - **Users**
//!   - `GET    /api/users` — all users, nickname ascending
//!   - `GET    /api/users/{email}` — one user
//!   - `PUT    /api/users/{email}` — create on first sign-in / rename
//!
//! - **Projects**
//!   - `GET    /api/projects` — project list (`?owner=` filters)
//!   - `POST   /api/projects` — create
//!   - `GET    /api/projects/{id}` — one project, tag in `ETag`
//!   - `PUT    /api/projects/{id}` — rename, requires `If-Match`
//!   - `DELETE /api/projects/{id}` — best-effort cascade, returns report
//!   - `POST   /api/projects/{id}/artwork` — multipart image + thumbnail
//!
//! - **Versions & comments**
//!   - `GET/POST /api/projects/{id}/versions`, `DELETE .../versions/{n}`
//!   - `GET/POST /api/projects/{id}/comments`, `POST .../comments/image`,
//!     `DELETE .../comments/{createdAtMillis}`
//!
//! - **Blobs & real-time**
//!   - `GET /files/{name}` — signed download, `GET /api/files/{name}/url`
//!   - `GET /ws` — WebSocket subscription protocol

use crate::{
    AppState,
    handlers::{
        file_handlers::{file_url, get_file},
        health_handlers::{healthz, readyz},
        project_handlers::{
            create_comment, create_project, delete_comment, delete_project, delete_version,
            get_project, list_comments, list_projects, list_versions, update_project,
        },
        upload_handlers::{create_image_comment, upload_artwork, upload_version},
        user_handlers::{get_user, list_users, upsert_user},
    },
    hub::ws::ws_handler,
};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Build and return the router for the whole API.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // real-time subscription protocol
        .route("/ws", get(ws_handler))
        // users
        .route("/api/users", get(list_users))
        .route("/api/users/{email}", get(get_user).put(upsert_user))
        // projects
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/api/projects/{id}/artwork", post(upload_artwork))
        // versions
        .route(
            "/api/projects/{id}/versions",
            get(list_versions).post(upload_version),
        )
        .route(
            "/api/projects/{id}/versions/{version}",
            delete(delete_version),
        )
        // comments
        .route(
            "/api/projects/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/api/projects/{id}/comments/image", post(create_image_comment))
        .route(
            "/api/projects/{id}/comments/{created_at}",
            delete(delete_comment),
        )
        // blobs
        .route("/files/{name}", get(get_file))
        .route("/api/files/{name}/url", get(file_url))
}
