pub mod file_handlers;
pub mod health_handlers;
pub mod project_handlers;
pub mod upload_handlers;
pub mod user_handlers;
