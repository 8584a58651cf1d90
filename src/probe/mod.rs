//! Memory measurement over dynamically discovered process trees.
//!
//! Two non-interchangeable strategies are offered:
//!
//! - **Resident set**: summed from a single snapshot. Cheap, but shared
//!   library pages are counted once per process, which inflates
//!   many-process topologies far more than one daemon plus thin relays.
//! - **Private dirty**: one introspection call per process. Accurate but
//!   slow, so it only runs during calibration.
//!
//! Targets are either whole trees ([`ProbeTarget::Tree`]) or single
//! processes ([`ProbeTarget::Single`]). A relay is measured as a single
//! process so nothing below it is attributed twice. All targets of one
//! measurement are merged into one pid set before summing.

pub mod detail;
pub mod size;
pub mod snapshot;
pub mod tree;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::TimeoutConfig;
use crate::probe::detail::MemoryDetailProvider;
use crate::probe::snapshot::{ProcessSnapshot, ProcessSnapshotProvider};
use crate::probe::tree::{descendants_of_all, ProcessTreeResolver};

pub use detail::{SmapsRollupDetailProvider, VmmapDetailProvider};
pub use size::parse_size_kb;
pub use snapshot::{ProcessRecord, ProcfsSnapshotProvider, PsSnapshotProvider};

/// What to measure for one process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    /// The process and all of its descendants.
    Tree(u32),
    /// The process alone.
    Single(u32),
}

/// Aggregate memory figures for one measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemorySample {
    /// Resident-set aggregate in kB.
    pub rss_kb: u64,
    /// Private-dirty aggregate in kB; zero when not requested.
    pub dirty_kb: u64,
    /// Number of distinct processes measured.
    pub processes: usize,
}

/// Memory prober combining a snapshot source and a detail source.
#[derive(Clone)]
pub struct MemoryProbe {
    resolver: ProcessTreeResolver,
    details: Arc<dyn MemoryDetailProvider>,
}

impl MemoryProbe {
    /// Probe using the given collaborators.
    #[must_use]
    pub fn new(
        snapshots: Arc<dyn ProcessSnapshotProvider>,
        details: Arc<dyn MemoryDetailProvider>,
    ) -> Self {
        Self {
            resolver: ProcessTreeResolver::new(snapshots),
            details,
        }
    }

    /// Probe using the native collaborators of the current platform.
    #[must_use]
    pub fn for_platform(timeouts: &TimeoutConfig) -> Self {
        let (snapshots, details) = platform_providers(timeouts);
        Self::new(snapshots, details)
    }

    /// Resident-set aggregate of the tree rooted at `root`.
    pub async fn tree_rss_kb(&self, root: u32) -> u64 {
        self.measure(&[ProbeTarget::Tree(root)], false).await.rss_kb
    }

    /// Resident-set figure of `pid` alone.
    pub async fn single_rss_kb(&self, pid: u32) -> u64 {
        self.measure(&[ProbeTarget::Single(pid)], false).await.rss_kb
    }

    /// Private-dirty aggregate of the tree rooted at `root`.
    pub async fn tree_dirty_kb(&self, root: u32) -> u64 {
        self.measure(&[ProbeTarget::Tree(root)], true).await.dirty_kb
    }

    /// Private-dirty figure of `pid` alone.
    pub async fn single_dirty_kb(&self, pid: u32) -> u64 {
        self.measure(&[ProbeTarget::Single(pid)], true).await.dirty_kb
    }

    /// Measure the union of `targets` from one fresh snapshot.
    ///
    /// With `with_dirty`, every resolved pid is also introspected for
    /// private dirty memory; a failure on one pid contributes zero.
    pub async fn measure(&self, targets: &[ProbeTarget], with_dirty: bool) -> MemorySample {
        let snapshot = self.resolver.snapshot_or_empty().await;
        let pids = resolve_targets(&snapshot, targets);

        let rss_kb = pids
            .iter()
            .filter_map(|pid| snapshot.get(*pid))
            .map(|record| record.rss_kb)
            .sum();

        let dirty_kb = if with_dirty {
            self.sum_dirty(&snapshot, &pids).await
        } else {
            0
        };

        debug!(
            targets = targets.len(),
            processes = pids.len(),
            rss_kb,
            dirty_kb,
            "memory sample taken"
        );

        MemorySample {
            rss_kb,
            dirty_kb,
            processes: pids.len(),
        }
    }

    async fn sum_dirty(&self, snapshot: &ProcessSnapshot, pids: &BTreeSet<u32>) -> u64 {
        let mut total = 0_u64;
        for &pid in pids {
            // Some snapshot sources already carry the figure.
            if let Some(kb) = snapshot.get(pid).and_then(|r| r.private_dirty_kb) {
                total = total.saturating_add(kb);
                continue;
            }
            match self.details.private_dirty_kb(pid).await {
                Ok(kb) => total = total.saturating_add(kb),
                Err(err) => warn!(pid, %err, "private dirty probe failed, counting zero"),
            }
        }
        total
    }
}

impl std::fmt::Debug for MemoryProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProbe")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// Merge tree and single targets into one pid set.
///
/// Single targets are only counted while alive in `snapshot`.
#[must_use]
pub fn resolve_targets(snapshot: &ProcessSnapshot, targets: &[ProbeTarget]) -> BTreeSet<u32> {
    let roots: Vec<u32> = targets
        .iter()
        .filter_map(|t| match t {
            ProbeTarget::Tree(pid) => Some(*pid),
            ProbeTarget::Single(_) => None,
        })
        .collect();

    let mut pids = descendants_of_all(snapshot, &roots);
    pids.extend(targets.iter().filter_map(|t| match t {
        ProbeTarget::Single(pid) if snapshot.contains(*pid) => Some(*pid),
        _ => None,
    }));
    pids
}

/// Snapshot and detail collaborators native to the current platform.
///
/// Linux reads `/proc` directly; other platforms shell out to `ps` and
/// `vmmap`.
#[must_use]
pub fn platform_providers(
    timeouts: &TimeoutConfig,
) -> (Arc<dyn ProcessSnapshotProvider>, Arc<dyn MemoryDetailProvider>) {
    if cfg!(target_os = "linux") {
        (
            Arc::new(ProcfsSnapshotProvider::new()),
            Arc::new(SmapsRollupDetailProvider::new()),
        )
    } else {
        (
            Arc::new(PsSnapshotProvider::new(timeouts.probe())),
            Arc::new(VmmapDetailProvider::new(timeouts.probe())),
        )
    }
}
