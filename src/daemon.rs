//! Isolated shared-daemon environment for the relayed deployment model.
//!
//! Each experiment run gets its own temporary directory holding:
//!
//! ```text
//! <tmp>/relay-bench-XXXX/
//!   config/        configuration directory (config.json, daemon pid file)
//!   tmp/           TMPDIR for the relay, so its control socket is private
//! ```
//!
//! Relays are started with `<config_dir_env>=<tmp>/config` and
//! `TMPDIR=<tmp>/tmp`; the first relay brings the daemon up on demand.
//! [`SharedDaemonEnv::teardown`] stops the daemon best-effort and removes
//! the directory, whatever happened in between.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::BenchConfig;
use crate::{AppError, Result};

/// Daemon configuration document written for the relay executable.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DaemonConfigFile {
    /// Backend server idle timeout, e.g. `5m`.
    pub server_idle_timeout: String,
    /// Relay idle timeout, e.g. `5m`.
    pub idle_timeout: String,
    /// Daemon log level.
    pub log_level: String,
    /// Logical server name → spawn command.
    pub servers: BTreeMap<String, ServerEntry>,
}

/// Spawn command for one logical server.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServerEntry {
    /// Executable.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
}

impl DaemonConfigFile {
    /// Document registering the configured direct-mode server under
    /// `server_name`.
    #[must_use]
    pub fn from_bench_config(config: &BenchConfig) -> Self {
        let (command, args) = config
            .server_command
            .split_first()
            .map(|(c, a)| (c.clone(), a.to_vec()))
            .unwrap_or_default();

        let mut servers = BTreeMap::new();
        servers.insert(config.server_name.clone(), ServerEntry { command, args });

        Self {
            server_idle_timeout: config.daemon.server_idle_timeout.clone(),
            idle_timeout: config.daemon.idle_timeout.clone(),
            log_level: config.daemon.log_level.clone(),
            servers,
        }
    }
}

/// A prepared, private shared-daemon environment.
#[derive(Debug)]
pub struct SharedDaemonEnv {
    root: Option<TempDir>,
    config_dir: PathBuf,
    socket_dir: PathBuf,
    env: Vec<(String, OsString)>,
    pid_file: PathBuf,
    relay_binary: PathBuf,
    stop_args: Vec<String>,
    stop_timeout: Duration,
    teardown_delay: Duration,
}

impl SharedDaemonEnv {
    /// Create the directory layout and write the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directories or the config file cannot
    /// be created.
    pub fn prepare(config: &BenchConfig) -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("relay-bench-")
            .tempdir()
            .map_err(|err| AppError::Io(format!("failed to create daemon dir: {err}")))?;

        let config_dir = root.path().join("config");
        let socket_dir = root.path().join("tmp");
        create_private_dir(&config_dir)?;
        create_private_dir(&socket_dir)?;

        let document = DaemonConfigFile::from_bench_config(config);
        let body = serde_json::to_vec_pretty(&document)
            .map_err(|err| AppError::Config(format!("failed to serialise daemon config: {err}")))?;
        write_private_file(&config_dir.join(&config.daemon.config_file), &body)?;

        let env = vec![
            (
                config.daemon.config_dir_env.clone(),
                config_dir.clone().into_os_string(),
            ),
            ("TMPDIR".to_owned(), socket_dir.clone().into_os_string()),
        ];

        info!(dir = %root.path().display(), "shared daemon environment prepared");

        Ok(Self {
            pid_file: config_dir.join(&config.daemon.pid_file),
            root: Some(root),
            config_dir,
            socket_dir,
            env,
            relay_binary: config.relay_binary.clone(),
            stop_args: config.stop_args.clone(),
            stop_timeout: config.timeouts.stop(),
            teardown_delay: config.pacing.teardown(),
        })
    }

    /// Environment overrides every relay must be started with.
    #[must_use]
    pub fn env_vars(&self) -> &[(String, OsString)] {
        &self.env
    }

    /// Daemon configuration directory.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Private temp directory handed to relays as `TMPDIR`.
    #[must_use]
    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    /// Pid of the running daemon, read from its pid file.
    ///
    /// `None` if the file is missing or does not hold a number.
    #[must_use]
    pub fn daemon_pid(&self) -> Option<u32> {
        let raw = std::fs::read_to_string(&self.pid_file).ok()?;
        let pid = raw.trim().parse::<u32>().ok();
        if pid.is_none() {
            warn!(path = %self.pid_file.display(), "daemon pid file is not a number");
        }
        pid
    }

    /// Ask the relay executable to stop the daemon. Best-effort, idempotent.
    pub async fn stop(&self) {
        let mut cmd = Command::new(&self.relay_binary);
        cmd.args(&self.stop_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let outcome = match cmd.spawn() {
            Ok(mut child) => tokio::time::timeout(self.stop_timeout, child.wait()).await,
            Err(err) => {
                warn!(%err, "failed to run daemon stop command");
                return;
            }
        };

        match outcome {
            Ok(Ok(status)) => debug!(%status, "daemon stop command finished"),
            Ok(Err(err)) => warn!(%err, "daemon stop command failed"),
            Err(_) => warn!(timeout = ?self.stop_timeout, "daemon stop command timed out"),
        }
    }

    /// Stop the daemon, wait briefly, and remove the directory.
    pub async fn teardown(mut self) {
        self.stop().await;
        tokio::time::sleep(self.teardown_delay).await;

        if let Some(root) = self.root.take() {
            let path = root.path().to_path_buf();
            if let Err(err) = root.close() {
                warn!(dir = %path.display(), %err, "failed to remove daemon dir");
            } else {
                info!(dir = %path.display(), "shared daemon environment removed");
            }
        }
    }
}

fn create_private_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|err| AppError::Io(format!("failed to create {}: {err}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .map_err(|err| AppError::Io(format!("failed to restrict {}: {err}", path.display())))?;
    }

    Ok(())
}

fn write_private_file(path: &Path, body: &[u8]) -> Result<()> {
    std::fs::write(path, body)
        .map_err(|err| AppError::Io(format!("failed to write {}: {err}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|err| AppError::Io(format!("failed to restrict {}: {err}", path.display())))?;
    }

    Ok(())
}
