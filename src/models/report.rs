//! The experiment report handed to the reporter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::phase::{estimate_dirty_kb, Calibration, PhaseResult, SurvivalResult};

/// Everything one experiment run produced, in phase order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the last phase finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Session counts exercised, in order.
    pub session_counts: Vec<usize>,
    /// Direct-mode scaling results, one per count.
    pub direct: Vec<PhaseResult>,
    /// Shared-mode scaling results, one per count.
    pub shared: Vec<PhaseResult>,
    /// Survival and reconnect outcome.
    pub survival: SurvivalResult,
    /// Private-dirty calibration, if it ran.
    pub calibration: Option<Calibration>,
}

impl ExperimentReport {
    /// Empty report for `session_counts`, stamped with the current time.
    #[must_use]
    pub fn new(session_counts: Vec<usize>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            session_counts,
            direct: Vec::new(),
            shared: Vec::new(),
            survival: SurvivalResult::default(),
            calibration: None,
        }
    }

    /// Direct-mode result for `sessions`, if recorded.
    #[must_use]
    pub fn direct_at(&self, sessions: usize) -> Option<&PhaseResult> {
        self.direct.iter().find(|r| r.sessions == sessions)
    }

    /// Shared-mode result for `sessions`, if recorded.
    #[must_use]
    pub fn shared_at(&self, sessions: usize) -> Option<&PhaseResult> {
        self.shared.iter().find(|r| r.sessions == sessions)
    }

    /// Direct ÷ shared resident-set ratio at `sessions`.
    ///
    /// `None` when the shared figure is zero or missing.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rss_ratio(&self, sessions: usize) -> Option<f64> {
        let direct = self.direct_at(sessions)?.rss_kb;
        let shared = self.shared_at(sessions)?.rss_kb;
        (shared > 0).then(|| direct as f64 / shared as f64)
    }

    /// Direct-mode dirty ratio from calibration, `1.0` without one.
    #[must_use]
    pub fn direct_ratio(&self) -> f64 {
        self.calibration.as_ref().map_or(1.0, Calibration::direct_ratio)
    }

    /// Shared-mode dirty ratio from calibration, `1.0` without one.
    #[must_use]
    pub fn shared_ratio(&self) -> f64 {
        self.calibration.as_ref().map_or(1.0, Calibration::shared_ratio)
    }

    /// Estimated private-dirty kB of the direct run at `sessions`.
    #[must_use]
    pub fn estimated_direct_dirty_kb(&self, sessions: usize) -> Option<u64> {
        let rss = self.direct_at(sessions)?.rss_kb;
        Some(estimate_dirty_kb(rss, self.direct_ratio()))
    }

    /// Estimated private-dirty kB of the shared run at `sessions`.
    #[must_use]
    pub fn estimated_shared_dirty_kb(&self, sessions: usize) -> Option<u64> {
        let rss = self.shared_at(sessions)?.rss_kb;
        Some(estimate_dirty_kb(rss, self.shared_ratio()))
    }

    /// First direct-mode handshake latency: the reference cold start.
    #[must_use]
    pub fn cold_start(&self) -> Option<Duration> {
        self.direct.first().and_then(PhaseResult::first_time)
    }

    /// How many times faster a reconnect is than a cold start.
    #[must_use]
    pub fn reconnect_speedup(&self) -> Option<f64> {
        let cold = self.cold_start()?;
        let reconnect = self.survival.reconnect_time?;
        (!cold.is_zero() && !reconnect.is_zero())
            .then(|| cold.as_secs_f64() / reconnect.as_secs_f64())
    }

    /// Whether every recorded step and the survival checks passed.
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.direct.iter().chain(&self.shared).all(|r| r.ok)
            && self.survival.survival_ok
            && self.survival.reconnect_ok
    }
}
