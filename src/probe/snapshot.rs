//! System process snapshots.
//!
//! A snapshot is a point-in-time table of `(pid, ppid, rss)` rows taken from
//! the operating system. Snapshots are rebuilt on every probe; child
//! processes come and go between measurements.
//!
//! Two collaborators are provided:
//!
//! | Provider                   | Source                              |
//! |----------------------------|-------------------------------------|
//! | [`PsSnapshotProvider`]     | `ps -eo pid=,ppid=,rss=`            |
//! | [`ProcfsSnapshotProvider`] | `/proc/<pid>/status` (Linux)        |

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::{AppError, Result};

/// One row of a process snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessRecord {
    /// Process identifier.
    pub pid: u32,
    /// Parent process identifier.
    pub ppid: u32,
    /// Resident-set size in kB.
    pub rss_kb: u64,
    /// Private dirty memory in kB, when the source reports it.
    pub private_dirty_kb: Option<u64>,
}

/// Immutable table of process records keyed by pid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    records: HashMap<u32, ProcessRecord>,
}

impl ProcessSnapshot {
    /// Build a snapshot; a later duplicate pid replaces an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = ProcessRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.pid, r)).collect(),
        }
    }

    /// Record for `pid`, if the process was alive when the snapshot was taken.
    #[must_use]
    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    /// Whether `pid` appears in the snapshot.
    #[must_use]
    pub fn contains(&self, pid: u32) -> bool {
        self.records.contains_key(&pid)
    }

    /// Iterate over every record in unspecified order.
    pub fn records(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.values()
    }

    /// Number of processes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no processes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Source of full-system process snapshots.
pub trait ProcessSnapshotProvider: Send + Sync {
    /// Take a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ProbeUnavailable`] if the source cannot be read.
    fn snapshot(&self) -> Pin<Box<dyn Future<Output = Result<ProcessSnapshot>> + Send + '_>>;
}

// ── ps ────────────────────────────────────────────────────────────────────────

/// Snapshot provider backed by the `ps` utility.
#[derive(Debug, Clone)]
pub struct PsSnapshotProvider {
    timeout: Duration,
}

impl PsSnapshotProvider {
    /// Provider whose `ps` invocation is killed after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ProcessSnapshotProvider for PsSnapshotProvider {
    fn snapshot(&self) -> Pin<Box<dyn Future<Output = Result<ProcessSnapshot>> + Send + '_>> {
        Box::pin(async move {
            let stdout = run_capture("ps", &["-eo", "pid=,ppid=,rss="], self.timeout).await?;
            Ok(parse_ps_output(&stdout))
        })
    }
}

/// Parse `ps -eo pid,ppid,rss` output.
///
/// A header row, if present, and any malformed rows are skipped.
#[must_use]
pub fn parse_ps_output(output: &str) -> ProcessSnapshot {
    let records = output.lines().filter_map(|line| {
        let mut parts = line.split_whitespace();
        let pid = parts.next()?.parse::<u32>().ok()?;
        let ppid = parts.next()?.parse::<u32>().ok()?;
        let rss_kb = parts.next()?.parse::<u64>().ok()?;
        Some(ProcessRecord {
            pid,
            ppid,
            rss_kb,
            private_dirty_kb: None,
        })
    });
    ProcessSnapshot::from_records(records)
}

// ── /proc ─────────────────────────────────────────────────────────────────────

/// Snapshot provider that scans `/proc/*/status` directly.
#[derive(Debug, Clone)]
pub struct ProcfsSnapshotProvider {
    root: PathBuf,
}

impl ProcfsSnapshotProvider {
    /// Provider reading from `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Provider reading from an alternate proc root (used by tests).
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcfsSnapshotProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSnapshotProvider for ProcfsSnapshotProvider {
    fn snapshot(&self) -> Pin<Box<dyn Future<Output = Result<ProcessSnapshot>> + Send + '_>> {
        let root = self.root.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || scan_proc(&root))
                .await
                .map_err(|err| AppError::ProbeUnavailable(format!("proc scan panicked: {err}")))?
        })
    }
}

fn scan_proc(root: &Path) -> Result<ProcessSnapshot> {
    let entries = std::fs::read_dir(root).map_err(|err| {
        AppError::ProbeUnavailable(format!("cannot read {}: {err}", root.display()))
    })?;

    let mut records = Vec::new();
    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };

        // Processes exit mid-scan; a missing status file just drops the row.
        let Ok(status) = std::fs::read_to_string(entry.path().join("status")) else {
            continue;
        };

        if let Some((ppid, rss_kb)) = parse_proc_status(&status) {
            records.push(ProcessRecord {
                pid,
                ppid,
                rss_kb,
                private_dirty_kb: None,
            });
        }
    }

    debug!(processes = records.len(), "proc scan complete");
    Ok(ProcessSnapshot::from_records(records))
}

/// Extract `(PPid, VmRSS kB)` from a `/proc/<pid>/status` document.
///
/// Kernel threads carry no `VmRSS` line and report zero.
#[must_use]
pub fn parse_proc_status(status: &str) -> Option<(u32, u64)> {
    let mut ppid = None;
    let mut rss_kb = 0;

    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("PPid:") {
            ppid = rest.trim().parse::<u32>().ok();
        } else if let Some(rest) = line.strip_prefix("VmRSS:") {
            rss_kb = rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
        }
    }

    ppid.map(|p| (p, rss_kb))
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Run an external utility and capture its stdout within `timeout`.
///
/// # Errors
///
/// Returns [`AppError::ProbeUnavailable`] on spawn failure, non-zero exit,
/// timeout, or non-UTF-8 output.
pub(crate) async fn run_capture(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| AppError::ProbeUnavailable(format!("failed to run {program}: {err}")))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| AppError::ProbeUnavailable(format!("{program} timed out after {timeout:?}")))?
        .map_err(|err| AppError::ProbeUnavailable(format!("{program} failed: {err}")))?;

    if !output.status.success() {
        return Err(AppError::ProbeUnavailable(format!(
            "{program} exited with {}",
            output.status
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|err| AppError::ProbeUnavailable(format!("{program} output not utf-8: {err}")))
}
