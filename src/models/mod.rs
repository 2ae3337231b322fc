//! Core data models for the project-sharing service.
//!
//! Four independent keyed collections: users, projects, project versions,
//! and comments. Every row carries an opaque `etag` regenerated on each
//! write, used for optimistic concurrency on the update path. All models
//! map to SQLite rows via `sqlx::FromRow` and serialize as camelCase JSON
//! via `serde`.

pub mod comment;
pub mod project;
pub mod user;
pub mod version;
