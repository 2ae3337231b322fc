//! Real-time notification hub.
//!
//! `protocol` defines the typed wire contract (client commands and server
//! events), `registry` tracks which live connections are subscribed to
//! which topics, and `ws` binds both to the WebSocket transport.

pub mod protocol;
pub mod registry;
pub mod ws;
