//! Benchmark configuration parsing and validation.
//!
//! Every field has a default, so an empty TOML document (or no file at all)
//! yields the stock filesystem-server experiment. Command-line overrides are
//! applied by the binary on top of the loaded value.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Read, shutdown, and probe timeouts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TimeoutConfig {
    /// Deadline for every single line read from a session.
    pub read_seconds: u64,
    /// Grace window between the cooperative stop signal and a forced kill.
    pub grace_seconds: u64,
    /// Bounded wait to reap a process after a forced kill.
    pub kill_wait_seconds: u64,
    /// Timeout for the external daemon stop invocation.
    pub stop_seconds: u64,
    /// Timeout for each external memory introspection call.
    pub probe_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_seconds: 60,
            grace_seconds: 5,
            kill_wait_seconds: 3,
            stop_seconds: 10,
            probe_seconds: 10,
        }
    }
}

impl TimeoutConfig {
    /// Line read deadline as a [`Duration`].
    #[must_use]
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_seconds)
    }

    /// Stop-signal grace window as a [`Duration`].
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_seconds)
    }

    /// Post-kill reap window as a [`Duration`].
    #[must_use]
    pub fn kill_wait(&self) -> Duration {
        Duration::from_secs(self.kill_wait_seconds)
    }

    /// Daemon stop timeout as a [`Duration`].
    #[must_use]
    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_seconds)
    }

    /// Per-process introspection timeout as a [`Duration`].
    #[must_use]
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_seconds)
    }
}

/// Fixed delays between experiment steps (milliseconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct PacingConfig {
    /// Delay before each memory probe so figures stabilise after startup.
    pub settle_ms: u64,
    /// Delay between direct-mode session counts.
    pub cooldown_ms: u64,
    /// Delay after closing a relay during the survival phase.
    pub pause_ms: u64,
    /// Delay between stopping the daemon and removing its directory.
    pub teardown_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 500,
            cooldown_ms: 1000,
            pause_ms: 300,
            teardown_ms: 500,
        }
    }
}

impl PacingConfig {
    /// Settle delay as a [`Duration`].
    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Cooldown delay as a [`Duration`].
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Survival pause as a [`Duration`].
    #[must_use]
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    /// Teardown delay as a [`Duration`].
    #[must_use]
    pub fn teardown(&self) -> Duration {
        Duration::from_millis(self.teardown_ms)
    }
}

/// Shared-daemon layout consumed by the relay executable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DaemonConfig {
    /// Environment variable the relay reads its configuration directory from.
    pub config_dir_env: String,
    /// Name of the daemon pid file inside the configuration directory.
    pub pid_file: String,
    /// Name of the configuration document written for the daemon.
    pub config_file: String,
    /// Relay idle timeout written into the daemon configuration.
    pub idle_timeout: String,
    /// Backend server idle timeout written into the daemon configuration.
    pub server_idle_timeout: String,
    /// Daemon log level written into the daemon configuration.
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_dir_env: "MCPL_CONFIG_DIR".into(),
            pid_file: "mcpl.pid".into(),
            config_file: "config.json".into(),
            idle_timeout: "5m".into(),
            server_idle_timeout: "5m".into(),
            log_level: "info".into(),
        }
    }
}

fn default_relay_binary() -> PathBuf {
    PathBuf::from("./mcpl")
}

fn default_server_name() -> String {
    "filesystem".into()
}

fn default_server_command() -> Vec<String> {
    ["npx", "-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_session_counts() -> Vec<usize> {
    vec![2, 3, 5, 8, 13]
}

fn default_calibration_sessions() -> usize {
    3
}

fn default_probe_tool() -> String {
    "list_directory".into()
}

fn default_probe_arguments() -> serde_json::Value {
    serde_json::json!({ "path": "/tmp" })
}

fn default_stop_args() -> Vec<String> {
    vec!["stop".into()]
}

fn default_true() -> bool {
    true
}

/// Complete experiment configuration, passed explicitly to the orchestrator.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct BenchConfig {
    /// Relay executable used for the shared-daemon mode.
    #[serde(default = "default_relay_binary")]
    pub relay_binary: PathBuf,
    /// Arguments passed to the relay for each session.
    ///
    /// Defaults to `connect <server_name>` when left empty.
    #[serde(default)]
    pub relay_args: Vec<String>,
    /// Arguments passed to the relay to stop the shared daemon.
    #[serde(default = "default_stop_args")]
    pub stop_args: Vec<String>,
    /// Logical server name registered in the daemon configuration.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// Direct-mode argv; the first element is the executable.
    #[serde(default = "default_server_command")]
    pub server_command: Vec<String>,
    /// Session counts exercised by both scaling phases, in order.
    #[serde(default = "default_session_counts")]
    pub session_counts: Vec<usize>,
    /// Session count for the private-dirty calibration run.
    #[serde(default = "default_calibration_sessions")]
    pub calibration_sessions: usize,
    /// Tool invoked once per session to prove correctness.
    #[serde(default = "default_probe_tool")]
    pub probe_tool: String,
    /// Arguments for [`Self::probe_tool`].
    #[serde(default = "default_probe_arguments")]
    pub probe_arguments: serde_json::Value,
    /// Whether to start one throwaway server before measuring.
    #[serde(default = "default_true")]
    pub warmup: bool,
    /// Timeout settings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Delay settings.
    #[serde(default)]
    pub pacing: PacingConfig,
    /// Shared-daemon layout.
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            relay_binary: default_relay_binary(),
            relay_args: Vec::new(),
            stop_args: default_stop_args(),
            server_name: default_server_name(),
            server_command: default_server_command(),
            session_counts: default_session_counts(),
            calibration_sessions: default_calibration_sessions(),
            probe_tool: default_probe_tool(),
            probe_arguments: default_probe_arguments(),
            warmup: true,
            timeouts: TimeoutConfig::default(),
            pacing: PacingConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Relay arguments for one session, `connect <server_name>` by default.
    #[must_use]
    pub fn effective_relay_args(&self) -> Vec<String> {
        if self.relay_args.is_empty() {
            vec!["connect".into(), self.server_name.clone()]
        } else {
            self.relay_args.clone()
        }
    }

    /// Session count used by the calibration phase.
    ///
    /// Capped at the largest configured count.
    #[must_use]
    pub fn calibration_count(&self) -> usize {
        let max = self.session_counts.iter().copied().max().unwrap_or(1);
        self.calibration_sessions.min(max)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.server_command.is_empty() || self.server_command[0].trim().is_empty() {
            return Err(AppError::Config("server_command must not be empty".into()));
        }

        if self.session_counts.is_empty() {
            return Err(AppError::Config("session_counts must not be empty".into()));
        }

        if self.session_counts.contains(&0) {
            return Err(AppError::Config(
                "session_counts must be greater than zero".into(),
            ));
        }

        if self.calibration_sessions == 0 {
            return Err(AppError::Config(
                "calibration_sessions must be greater than zero".into(),
            ));
        }

        if self.timeouts.read_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.read_seconds must be greater than zero".into(),
            ));
        }

        if self.probe_tool.trim().is_empty() {
            return Err(AppError::Config("probe_tool must not be empty".into()));
        }

        Ok(())
    }
}
