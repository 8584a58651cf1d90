//! Minimal MCP client protocol: the initialize handshake and one tool call.
//!
//! - `messages`: JSON-RPC request builders and reply classification.
//! - `driver`: request/response exchanges over a [`LineReader`](crate::transport::LineReader).
//!
//! Exactly one request is outstanding per session at a time; replies are
//! matched to requests by read order, never by id.

pub mod driver;
pub mod messages;

pub use driver::{handshake, invoke, Handshake};
pub use messages::classify_response;
