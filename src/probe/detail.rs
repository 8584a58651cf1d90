//! Per-process private dirty memory introspection.
//!
//! Much more expensive than a snapshot: one external call (or file read) per
//! process. Each call is independent; callers treat a failure as zero.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use crate::probe::size::parse_size_kb;
use crate::probe::snapshot::run_capture;
use crate::{AppError, Result};

/// Source of a single process's private dirty memory figure.
pub trait MemoryDetailProvider: Send + Sync {
    /// Private dirty memory of `pid` in kB.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ProbeUnavailable`] if the figure cannot be read.
    fn private_dirty_kb(&self, pid: u32) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>>;
}

// ── vmmap (macOS) ─────────────────────────────────────────────────────────────

/// Detail provider backed by `vmmap -summary <pid>`.
#[derive(Debug, Clone)]
pub struct VmmapDetailProvider {
    timeout: Duration,
}

impl VmmapDetailProvider {
    /// Provider whose `vmmap` invocations are killed after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl MemoryDetailProvider for VmmapDetailProvider {
    fn private_dirty_kb(&self, pid: u32) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let pid_arg = pid.to_string();
            let out = run_capture("vmmap", &["-summary", pid_arg.as_str()], self.timeout).await?;
            parse_vmmap_summary(&out).ok_or_else(|| {
                AppError::ProbeUnavailable(format!("no TOTAL row in vmmap output for pid {pid}"))
            })
        })
    }
}

/// Dirty column of the `TOTAL` row in `vmmap -summary` output.
///
/// The row reads `TOTAL  <virtual>  <resident>  <dirty>  …`; the
/// `TOTAL, minus reserved VM space` row is ignored.
#[must_use]
pub fn parse_vmmap_summary(output: &str) -> Option<u64> {
    output
        .lines()
        .filter(|line| line.starts_with("TOTAL") && !line.contains("minus"))
        .find_map(|line| line.split_whitespace().nth(3).and_then(parse_size_kb))
}

// ── smaps_rollup (Linux) ──────────────────────────────────────────────────────

/// Detail provider reading `/proc/<pid>/smaps_rollup`.
#[derive(Debug, Clone)]
pub struct SmapsRollupDetailProvider {
    root: PathBuf,
}

impl SmapsRollupDetailProvider {
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

impl Default for SmapsRollupDetailProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDetailProvider for SmapsRollupDetailProvider {
    fn private_dirty_kb(&self, pid: u32) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        let path = self.root.join(pid.to_string()).join("smaps_rollup");
        Box::pin(async move {
            let raw = tokio::fs::read_to_string(&path).await.map_err(|err| {
                AppError::ProbeUnavailable(format!("cannot read {}: {err}", path.display()))
            })?;
            parse_smaps_rollup(&raw).ok_or_else(|| {
                AppError::ProbeUnavailable(format!("no Private_Dirty in {}", path.display()))
            })
        })
    }
}

/// Sum of `Private_Dirty` lines (kB) in a smaps or smaps_rollup document.
#[must_use]
pub fn parse_smaps_rollup(raw: &str) -> Option<u64> {
    let mut found = false;
    let mut total = 0_u64;

    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("Private_Dirty:") {
            let kb = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            total = total.saturating_add(kb);
            found = true;
        }
    }

    found.then_some(total)
}
