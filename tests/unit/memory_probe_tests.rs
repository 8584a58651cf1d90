//! Unit tests for `MemoryProbe` over synthetic collaborators.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use relay_bench::probe::detail::MemoryDetailProvider;
use relay_bench::probe::snapshot::{ProcessSnapshot, ProcessSnapshotProvider};
use relay_bench::probe::{resolve_targets, MemoryProbe, ProbeTarget, ProcessRecord};
use relay_bench::{AppError, Result};

// ── Synthetic collaborators ─────────────────────────────────────────────────

/// Always returns the same snapshot.
pub struct FixedSnapshots(pub ProcessSnapshot);

impl ProcessSnapshotProvider for FixedSnapshots {
    fn snapshot(&self) -> Pin<Box<dyn Future<Output = Result<ProcessSnapshot>> + Send + '_>> {
        let snapshot = self.0.clone();
        Box::pin(async move { Ok(snapshot) })
    }
}

/// Always fails, like `ps` missing from the system.
pub struct FailingSnapshots;

impl ProcessSnapshotProvider for FailingSnapshots {
    fn snapshot(&self) -> Pin<Box<dyn Future<Output = Result<ProcessSnapshot>> + Send + '_>> {
        Box::pin(async { Err(AppError::ProbeUnavailable("ps not installed".into())) })
    }
}

/// Private dirty figures by pid; unknown pids fail.
pub struct FixedDetails(pub HashMap<u32, u64>);

impl MemoryDetailProvider for FixedDetails {
    fn private_dirty_kb(&self, pid: u32) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        let figure = self.0.get(&pid).copied();
        Box::pin(async move {
            figure.ok_or_else(|| AppError::ProbeUnavailable(format!("no figure for {pid}")))
        })
    }
}

fn record(pid: u32, ppid: u32, rss_kb: u64) -> ProcessRecord {
    ProcessRecord {
        pid,
        ppid,
        rss_kb,
        private_dirty_kb: None,
    }
}

/// Two direct servers (each `npx → node`), one daemon with a backend, and
/// two relays.
fn topology() -> ProcessSnapshot {
    ProcessSnapshot::from_records([
        record(1, 0, 4),
        // direct #1
        record(100, 1, 40_000),
        record(101, 100, 60_000),
        // direct #2
        record(200, 1, 40_000),
        record(201, 200, 60_000),
        // daemon + backend
        record(300, 1, 12_000),
        record(301, 300, 70_000),
        // relays
        record(400, 1, 3_000),
        record(401, 1, 3_000),
    ])
}

fn probe(details: HashMap<u32, u64>) -> MemoryProbe {
    MemoryProbe::new(
        Arc::new(FixedSnapshots(topology())),
        Arc::new(FixedDetails(details)),
    )
}

// ── Resident set ────────────────────────────────────────────────────────────

#[tokio::test]
async fn tree_rss_sums_root_and_children() {
    let probe = probe(HashMap::new());

    assert_eq!(probe.tree_rss_kb(100).await, 100_000);
    assert_eq!(probe.single_rss_kb(100).await, 40_000);
}

#[tokio::test]
async fn direct_union_sums_every_tree() {
    let probe = probe(HashMap::new());

    let sample = probe
        .measure(&[ProbeTarget::Tree(100), ProbeTarget::Tree(200)], false)
        .await;
    assert_eq!(sample.rss_kb, 200_000);
    assert_eq!(sample.processes, 4);
    assert_eq!(sample.dirty_kb, 0, "dirty probe must not run unless asked");
}

/// Daemon tree plus each relay alone; the relays' children (none here) and
/// unrelated processes stay out.
#[tokio::test]
async fn shared_measure_adds_daemon_tree_and_relays() {
    let probe = probe(HashMap::new());

    let sample = probe
        .measure(
            &[
                ProbeTarget::Single(400),
                ProbeTarget::Single(401),
                ProbeTarget::Tree(300),
            ],
            false,
        )
        .await;
    assert_eq!(sample.rss_kb, 12_000 + 70_000 + 3_000 + 3_000);
    assert_eq!(sample.processes, 4);
}

#[tokio::test]
async fn exited_targets_measure_zero() {
    let probe = probe(HashMap::new());

    let sample = probe
        .measure(&[ProbeTarget::Tree(9_999), ProbeTarget::Single(9_998)], false)
        .await;
    assert_eq!(sample.rss_kb, 0);
    assert_eq!(sample.processes, 0);
}

#[tokio::test]
async fn snapshot_failure_measures_zero() {
    let probe = MemoryProbe::new(
        Arc::new(FailingSnapshots),
        Arc::new(FixedDetails(HashMap::new())),
    );

    assert_eq!(probe.tree_rss_kb(100).await, 0);
}

// ── Private dirty ───────────────────────────────────────────────────────────

#[tokio::test]
async fn tree_dirty_sums_detail_figures() {
    let probe = probe(HashMap::from([(100, 10_000), (101, 30_000)]));

    assert_eq!(probe.tree_dirty_kb(100).await, 40_000);
    assert_eq!(probe.single_dirty_kb(101).await, 30_000);
}

/// A pid whose detail probe fails contributes zero; the rest still count.
#[tokio::test]
async fn failing_detail_counts_zero() {
    let probe = probe(HashMap::from([(100, 10_000)]));

    let sample = probe.measure(&[ProbeTarget::Tree(100)], true).await;
    assert_eq!(sample.dirty_kb, 10_000);
    assert_eq!(sample.rss_kb, 100_000);
}

/// Snapshot rows that already carry a dirty figure skip the detail call.
#[tokio::test]
async fn snapshot_dirty_figure_preferred() {
    let snapshot = ProcessSnapshot::from_records([ProcessRecord {
        pid: 7,
        ppid: 1,
        rss_kb: 500,
        private_dirty_kb: Some(120),
    }]);
    let probe = MemoryProbe::new(
        Arc::new(FixedSnapshots(snapshot)),
        Arc::new(FixedDetails(HashMap::from([(7, 999)]))),
    );

    assert_eq!(probe.single_dirty_kb(7).await, 120);
}

// ── Target resolution ───────────────────────────────────────────────────────

#[test]
fn single_target_never_pulls_in_children() {
    let pids = resolve_targets(&topology(), &[ProbeTarget::Single(100)]);

    assert_eq!(pids.into_iter().collect::<Vec<_>>(), vec![100]);
}

#[test]
fn tree_and_single_overlap_counted_once() {
    let pids = resolve_targets(
        &topology(),
        &[ProbeTarget::Tree(300), ProbeTarget::Single(301)],
    );

    assert_eq!(pids.into_iter().collect::<Vec<_>>(), vec![300, 301]);
}
