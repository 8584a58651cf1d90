//! Session process spawning and termination.
//!
//! Spawns server or relay processes with:
//! - piped stdin/stdout for the protocol and a discarded stderr, so a
//!   chatty server can never block on a full pipe;
//! - `kill_on_drop(true)` so a session dropped on an unexpected path still
//!   takes its process with it.
//!
//! [`SessionLauncher::close`] is the orderly path: stdin is closed, a
//! cooperative stop signal is sent, and after a grace window the process is
//! killed and reaped within a bounded wait.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::BenchConfig;
use crate::session::{Session, SessionMode};
use crate::{AppError, Result};

/// Opens and closes benchmark sessions for both deployment models.
#[derive(Debug)]
pub struct SessionLauncher {
    server_command: Vec<String>,
    relay_binary: PathBuf,
    relay_args: Vec<String>,
    read_timeout: Duration,
    grace: Duration,
    kill_wait: Duration,
    sequence: AtomicU64,
}

impl SessionLauncher {
    /// Launcher configured from `config`.
    #[must_use]
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            server_command: config.server_command.clone(),
            relay_binary: config.relay_binary.clone(),
            relay_args: config.effective_relay_args(),
            read_timeout: config.timeouts.read(),
            grace: config.timeouts.grace(),
            kill_wait: config.timeouts.kill_wait(),
            sequence: AtomicU64::new(1),
        }
    }

    /// Start one direct server process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the server cannot be started.
    pub fn open_direct(&self) -> Result<Session> {
        let (program, args) = self
            .server_command
            .split_first()
            .ok_or_else(|| AppError::Config("server_command must not be empty".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        self.spawn(cmd, SessionMode::Direct)
    }

    /// Start one relay process attached to the shared daemon.
    ///
    /// `env` is layered over the inherited environment; it must carry the
    /// daemon configuration directory and the isolated temp directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the relay cannot be started.
    pub fn open_relayed(&self, env: &[(String, OsString)]) -> Result<Session> {
        let mut cmd = Command::new(&self.relay_binary);
        cmd.args(&self.relay_args);
        for (key, value) in env {
            cmd.env(key, value);
        }
        self.spawn(cmd, SessionMode::Relayed)
    }

    /// Terminate the session's process and reap it.
    ///
    /// Never fails; escalation problems are logged. Returns the exit status
    /// when the process was reaped.
    pub async fn close(&self, session: Session) -> Option<ExitStatus> {
        let Session {
            label,
            pid,
            mut child,
            stdin,
            ..
        } = session;

        // EOF on stdin is itself a stop request for stdio servers.
        drop(stdin);

        let status = terminate(&mut child, pid, self.grace, self.kill_wait).await;
        match status {
            Some(status) => debug!(session = label.as_str(), pid, %status, "session closed"),
            None => warn!(session = label.as_str(), pid, "session process could not be reaped"),
        }
        status
    }

    fn spawn(&self, mut cmd: Command, mode: SessionMode) -> Result<Session> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let label = format!("{mode}#{seq}");

        let child = cmd
            .spawn()
            .map_err(|err| AppError::Spawn(format!("failed to spawn {label}: {err}")))?;
        let pid = child
            .id()
            .ok_or_else(|| AppError::Spawn(format!("{label} exited before it could be tracked")))?;

        info!(session = label.as_str(), pid, "session process spawned");
        Session::new(label, mode, pid, child, self.read_timeout)
    }
}

/// Stop `child` cooperatively, escalating to a kill after `grace`.
///
/// Returns `None` only if the process could not be reaped within
/// `kill_wait` after the kill.
pub async fn terminate(
    child: &mut Child,
    pid: u32,
    grace: Duration,
    kill_wait: Duration,
) -> Option<ExitStatus> {
    if let Ok(Some(status)) = child.try_wait() {
        return Some(status);
    }

    if request_stop(child, pid) {
        if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
            return Some(status);
        }
        debug!(pid, ?grace, "stop signal ignored, killing");
    }

    if let Err(err) = child.start_kill() {
        warn!(pid, %err, "failed to kill session process");
    }

    match tokio::time::timeout(kill_wait, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(err)) => {
            warn!(pid, %err, "failed to reap session process");
            None
        }
        Err(_) => None,
    }
}

/// Send the cooperative stop signal; `false` if it could not be delivered.
#[cfg(unix)]
fn request_stop(_child: &mut Child, pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(err) => {
            debug!(pid, %err, "SIGTERM not delivered");
            false
        }
    }
}

/// Platforms without signals have no cooperative stop; kill directly.
#[cfg(not(unix))]
fn request_stop(child: &mut Child, pid: u32) -> bool {
    if let Err(err) = child.start_kill() {
        debug!(pid, %err, "kill not delivered");
        return false;
    }
    true
}
