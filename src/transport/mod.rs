//! Newline-delimited stdio transport.
//!
//! A benchmark session talks to its server (or relay) over the child's
//! stdin/stdout. Inbound traffic goes through a deadline-aware
//! [`LineReader`](reader::LineReader); outbound messages are serialised by
//! [`write_json_line`](writer::write_json_line).
//!
//! - `codec`: splits stdout into terminated lines and a drained trailing remainder.
//! - `reader`: deadline-bounded line reads with a graceful end-of-stream drain.
//! - `writer`: compact JSON serialisation, one message per line.

pub mod codec;
pub mod reader;
pub mod writer;

pub use codec::{Frame, FrameDecoder};
pub use reader::LineReader;
pub use writer::write_json_line;
