#![forbid(unsafe_code)]

//! `relay-bench`: compares one MCP server process per client session with a
//! shared daemon fronted by thin stdio relays.

pub mod config;
pub mod daemon;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod probe;
pub mod protocol;
pub mod report;
pub mod session;
pub mod transport;

pub use config::BenchConfig;
pub use errors::{AppError, Result};
