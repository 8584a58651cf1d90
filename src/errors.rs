//! Error types shared across the harness.

use std::fmt::{Display, Formatter};

/// Shared harness result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Harness error enumeration covering every failure mode of a benchmark run.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// No complete line arrived before the read deadline.
    Timeout(String),
    /// The peer closed its output stream with nothing left to deliver.
    StreamClosed(String),
    /// A memory introspection collaborator failed or returned garbage.
    ProbeUnavailable(String),
    /// A reply carried neither `result` nor `error`, or was not JSON.
    MalformedResponse(String),
    /// A reply carried an `error` member.
    CallFailed(String),
    /// Line framing or serialisation failure on the wire.
    Protocol(String),
    /// A server or relay process could not be started.
    Spawn(String),
    /// A required external executable is missing.
    MissingExecutable(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether the error ends the session it occurred on.
    ///
    /// Read deadlines and closed streams leave the transport unusable;
    /// a failed call or a malformed reply only marks the session incorrect.
    #[must_use]
    pub fn is_fatal_to_session(&self) -> bool {
        !matches!(self, Self::CallFailed(_) | Self::MalformedResponse(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::StreamClosed(msg) => write!(f, "stream closed: {msg}"),
            Self::ProbeUnavailable(msg) => write!(f, "probe unavailable: {msg}"),
            Self::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
            Self::CallFailed(msg) => write!(f, "call failed: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::MissingExecutable(msg) => write!(f, "missing executable: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
