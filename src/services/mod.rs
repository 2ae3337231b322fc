pub mod blob_store;
pub mod cascade;
pub mod entity_store;
pub mod notifier;
pub mod thumbnails;
pub mod validation;
