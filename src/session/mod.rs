//! Benchmark sessions: one client connection to a server or relay process.
//!
//! A [`Session`] owns the child process, its stdin, and a deadline-aware
//! reader over its stdout. It records every handshake latency and keeps a
//! correctness flag that any failed exchange clears. Sessions are created
//! and destroyed by the [`SessionLauncher`](launcher::SessionLauncher).

pub mod launcher;

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde_json::Value;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tracing::warn;

use crate::protocol::{self, Handshake};
use crate::transport::LineReader;
use crate::{AppError, Result};

pub use launcher::SessionLauncher;

/// Deployment model a session was opened under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// One fresh server process per session.
    Direct,
    /// A thin relay attached to the shared daemon.
    Relayed,
}

impl Display for SessionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Relayed => write!(f, "relayed"),
        }
    }
}

/// A live connection to one server or relay process.
#[derive(Debug)]
pub struct Session {
    pub(crate) label: String,
    pub(crate) mode: SessionMode,
    pub(crate) pid: u32,
    pub(crate) child: Child,
    pub(crate) stdin: ChildStdin,
    pub(crate) reader: LineReader<ChildStdout>,
    pub(crate) read_timeout: Duration,
    latencies: Vec<Duration>,
    ok: bool,
}

impl Session {
    pub(crate) fn new(
        label: String,
        mode: SessionMode,
        pid: u32,
        mut child: Child,
        read_timeout: Duration,
    ) -> Result<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            AppError::Spawn(format!("failed to capture stdin of {label}"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            AppError::Spawn(format!("failed to capture stdout of {label}"))
        })?;

        Ok(Self {
            reader: LineReader::new(stdout, label.clone()),
            label,
            mode,
            pid,
            child,
            stdin,
            read_timeout,
            latencies: Vec::new(),
            ok: true,
        })
    }

    /// Human-readable identifier, e.g. `direct#3`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Deployment model of this session.
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// OS process id of the server or relay.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Handshake latencies recorded so far.
    #[must_use]
    pub fn latencies(&self) -> &[Duration] {
        &self.latencies
    }

    /// `false` once any exchange on this session failed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Run the initialize handshake and record its latency.
    ///
    /// # Errors
    ///
    /// Propagates any [`protocol::handshake`] failure after clearing the
    /// correctness flag.
    pub async fn handshake(&mut self) -> Result<Handshake> {
        match protocol::handshake(&mut self.reader, &mut self.stdin, self.read_timeout).await {
            Ok(done) => {
                self.latencies.push(done.elapsed);
                Ok(done)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Call `tool` once and return the successful reply.
    ///
    /// # Errors
    ///
    /// Propagates any [`protocol::invoke`] failure after clearing the
    /// correctness flag.
    pub async fn invoke(&mut self, tool: &str, arguments: &Value, id: u64) -> Result<Value> {
        let outcome = protocol::invoke(
            &mut self.reader,
            &mut self.stdin,
            tool,
            arguments,
            id,
            self.read_timeout,
        )
        .await;
        if let Err(ref err) = outcome {
            self.fail(err);
        }
        outcome
    }

    /// Call `tool` and report whether the reply proves correctness.
    ///
    /// An error reply or a reply without `result` yields `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Transport failures (timeout, closed stream, broken pipe) are
    /// returned; they leave the session unusable.
    pub async fn check_call(&mut self, tool: &str, arguments: &Value, id: u64) -> Result<bool> {
        match self.invoke(tool, arguments, id).await {
            Ok(_) => Ok(true),
            Err(err) if !err.is_fatal_to_session() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn fail(&mut self, err: &AppError) {
        warn!(session = self.label.as_str(), pid = self.pid, %err, "session exchange failed");
        self.ok = false;
    }
}
