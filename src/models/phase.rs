//! Per-phase measurement records.

use std::time::Duration;

use serde::Serialize;

use crate::models::{serialize_opt_secs, serialize_secs_list};
use crate::probe::MemorySample;

/// Outcome of one scaling step: N sessions opened, called, and measured.
///
/// Immutable once recorded. A step that failed as a whole carries zeroed
/// figures, `ok == false`, and the error text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseResult {
    /// Number of sessions requested for this step.
    pub sessions: usize,
    /// Resident-set aggregate in kB.
    pub rss_kb: u64,
    /// Private-dirty aggregate in kB; zero unless calibrating.
    pub dirty_kb: u64,
    /// Distinct processes measured.
    pub processes: usize,
    /// Handshake latency of each session, in open order.
    #[serde(serialize_with = "serialize_secs_list")]
    pub times: Vec<Duration>,
    /// Every session completed its handshake and correctness call.
    pub ok: bool,
    /// Why the step failed as a whole, if it did.
    pub error: Option<String>,
}

impl PhaseResult {
    /// Result for a step whose sessions all ran to completion.
    #[must_use]
    pub fn measured(sessions: usize, sample: MemorySample, times: Vec<Duration>, ok: bool) -> Self {
        Self {
            sessions,
            rss_kb: sample.rss_kb,
            dirty_kb: sample.dirty_kb,
            processes: sample.processes,
            times,
            ok,
            error: None,
        }
    }

    /// Zeroed result for a step that failed as a whole.
    #[must_use]
    pub fn failed(sessions: usize, error: impl Into<String>) -> Self {
        Self {
            sessions,
            rss_kb: 0,
            dirty_kb: 0,
            processes: 0,
            times: Vec::new(),
            ok: false,
            error: Some(error.into()),
        }
    }

    /// Mean handshake latency, if any session completed one.
    #[must_use]
    pub fn average_time(&self) -> Option<Duration> {
        let count = u32::try_from(self.times.len()).ok().filter(|c| *c > 0)?;
        Some(self.times.iter().sum::<Duration>() / count)
    }

    /// Handshake latency of the first session (the cold start).
    #[must_use]
    pub fn first_time(&self) -> Option<Duration> {
        self.times.first().copied()
    }

    /// Handshake latency of the Nth (last) session.
    #[must_use]
    pub fn last_time(&self) -> Option<Duration> {
        self.times.last().copied()
    }
}

/// Outcome of the survival and reconnect phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurvivalResult {
    /// The warm relay still answered after its sibling was killed.
    pub survival_ok: bool,
    /// A fresh relay attached after all others closed and answered.
    pub reconnect_ok: bool,
    /// Handshake latency of the fresh relay.
    #[serde(serialize_with = "serialize_opt_secs")]
    pub reconnect_time: Option<Duration>,
    /// Why the phase aborted, if it did.
    pub error: Option<String>,
}

impl SurvivalResult {
    /// Failed outcome carrying `error`.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Private-dirty calibration at one representative session count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    /// Session count the calibration ran at.
    pub sessions: usize,
    /// Direct-mode step measured with both strategies.
    pub direct: PhaseResult,
    /// Shared-mode step measured with both strategies.
    pub shared: PhaseResult,
}

impl Calibration {
    /// Dirty ÷ resident-set ratio for direct mode.
    #[must_use]
    pub fn direct_ratio(&self) -> f64 {
        calibration_ratio(self.direct.rss_kb, self.direct.dirty_kb)
    }

    /// Dirty ÷ resident-set ratio for shared mode.
    #[must_use]
    pub fn shared_ratio(&self) -> f64 {
        calibration_ratio(self.shared.rss_kb, self.shared.dirty_kb)
    }

    /// Whether either mode produced a private-dirty figure.
    #[must_use]
    pub fn has_dirty(&self) -> bool {
        self.has_direct_dirty() || self.shared.dirty_kb > 0
    }

    /// Whether the direct step produced a private-dirty figure.
    #[must_use]
    pub fn has_direct_dirty(&self) -> bool {
        self.direct.dirty_kb > 0
    }
}

/// Correction ratio `dirty / rss`, always within `(0, 1]`.
///
/// Falls back to `1.0` (no correction) when either figure is zero. A dirty
/// figure above the resident set can only come from the two probes racing
/// process startup, so it is clamped to `1.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calibration_ratio(rss_kb: u64, dirty_kb: u64) -> f64 {
    if rss_kb == 0 || dirty_kb == 0 {
        return 1.0;
    }
    (dirty_kb as f64 / rss_kb as f64).min(1.0)
}

/// Rescale a resident-set figure by a calibration ratio.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn estimate_dirty_kb(rss_kb: u64, ratio: f64) -> u64 {
    (rss_kb as f64 * ratio).round() as u64
}
