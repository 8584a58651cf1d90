//! Process tree resolution.
//!
//! Builds a parent → children adjacency map once per snapshot and walks it
//! breadth-first from the requested roots. A root that is missing from the
//! snapshot (already exited, or the snapshot is empty) resolves to nothing,
//! so a dead tree always measures as zero.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use tracing::warn;

use crate::probe::snapshot::{ProcessSnapshot, ProcessSnapshotProvider};

/// Root plus every transitive child of `root` present in `snapshot`.
#[must_use]
pub fn descendants(snapshot: &ProcessSnapshot, root: u32) -> BTreeSet<u32> {
    descendants_of_all(snapshot, &[root])
}

/// Union of the trees rooted at each of `roots`.
#[must_use]
pub fn descendants_of_all(snapshot: &ProcessSnapshot, roots: &[u32]) -> BTreeSet<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for record in snapshot.records() {
        // pid 0 parents itself on some platforms.
        if record.pid != record.ppid {
            children.entry(record.ppid).or_default().push(record.pid);
        }
    }

    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<u32> = roots
        .iter()
        .copied()
        .filter(|pid| snapshot.contains(*pid))
        .collect();

    while let Some(pid) = queue.pop_front() {
        if !seen.insert(pid) {
            continue;
        }
        if let Some(kids) = children.get(&pid) {
            queue.extend(kids.iter().copied().filter(|kid| !seen.contains(kid)));
        }
    }

    seen
}

/// Resolves process trees against fresh snapshots from a provider.
#[derive(Clone)]
pub struct ProcessTreeResolver {
    provider: Arc<dyn ProcessSnapshotProvider>,
}

impl ProcessTreeResolver {
    /// Resolver backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn ProcessSnapshotProvider>) -> Self {
        Self { provider }
    }

    /// Fresh snapshot, or an empty one if the provider fails.
    pub async fn snapshot_or_empty(&self) -> ProcessSnapshot {
        match self.provider.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%err, "process snapshot unavailable, measuring as empty");
                ProcessSnapshot::default()
            }
        }
    }

    /// Tree rooted at `root` in a fresh snapshot; empty on provider failure.
    pub async fn resolve(&self, root: u32) -> BTreeSet<u32> {
        let snapshot = self.snapshot_or_empty().await;
        descendants(&snapshot, root)
    }
}

impl std::fmt::Debug for ProcessTreeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTreeResolver").finish_non_exhaustive()
    }
}
