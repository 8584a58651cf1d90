//! Experiment orchestration.
//!
//! Runs the benchmark phases in a fixed order:
//!
//! 1. **Direct scaling**: N fresh server processes per session count.
//! 2. **Shared scaling**: N relays against one shared daemon.
//! 3. **Survival & reconnect**: killing one relay must not disturb another,
//!    and a fresh relay must attach to the still-running backend.
//! 4. **Calibration**: one direct and one shared step re-measured with the
//!    private-dirty probe to correct the resident-set figures.
//!
//! A failure inside a phase is recorded in its result and the sequence
//! continues. Only preflight failures abort the run.

pub mod preflight;
pub mod scaling;
pub mod survival;

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, info_span, Instrument};

use crate::config::BenchConfig;
use crate::daemon::SharedDaemonEnv;
use crate::models::{Calibration, ExperimentReport, PhaseResult, SurvivalResult};
use crate::probe::MemoryProbe;
use crate::session::{SessionLauncher, SessionMode};
use crate::Result;

/// One benchmark run: configuration plus its collaborators.
#[derive(Debug)]
pub struct Experiment {
    config: BenchConfig,
    launcher: SessionLauncher,
    probe: MemoryProbe,
}

impl Experiment {
    /// Experiment measuring memory with `probe`.
    #[must_use]
    pub fn new(config: BenchConfig, probe: MemoryProbe) -> Self {
        Self {
            launcher: SessionLauncher::new(&config),
            config,
            probe,
        }
    }

    /// Experiment using the platform's native memory collaborators.
    #[must_use]
    pub fn for_platform(config: BenchConfig) -> Self {
        let probe = MemoryProbe::for_platform(&config.timeouts);
        Self::new(config, probe)
    }

    /// Configuration the experiment runs with.
    #[must_use]
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run every phase and collect the report.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MissingExecutable` if the relay or the server
    /// command cannot be found. Everything after preflight is recorded in
    /// the report instead of failing the run.
    pub async fn run(&self) -> Result<ExperimentReport> {
        preflight::check_executables(&self.config)?;

        if self.config.warmup {
            preflight::warmup(&self.launcher, self.config.timeouts.read())
                .instrument(info_span!("warmup"))
                .await;
        }

        let mut report = ExperimentReport::new(self.config.session_counts.clone());
        info!(counts = ?report.session_counts, "experiment started");

        report.direct = self
            .scale(SessionMode::Direct, None)
            .instrument(info_span!("phase", phase = "direct"))
            .await;

        match SharedDaemonEnv::prepare(&self.config) {
            Ok(env) => {
                self.run_shared_phases(&env, &mut report).await;
                env.teardown().await;
            }
            Err(err) => {
                error!(%err, "shared daemon environment unavailable");
                let reason = err.to_string();
                report.shared = self
                    .config
                    .session_counts
                    .iter()
                    .map(|&n| PhaseResult::failed(n, reason.clone()))
                    .collect();
                report.survival = SurvivalResult::failed(reason);
            }
        }

        report.finished_at = Some(Utc::now());
        info!(all_ok = report.all_ok(), "experiment finished");
        Ok(report)
    }

    async fn run_shared_phases(&self, env: &SharedDaemonEnv, report: &mut ExperimentReport) {
        report.shared = self
            .scale(SessionMode::Relayed, Some(env))
            .instrument(info_span!("phase", phase = "shared"))
            .await;

        report.survival = self
            .survival(env)
            .instrument(info_span!("phase", phase = "survival"))
            .await;

        report.calibration = Some(
            self.calibrate(env)
                .instrument(info_span!("phase", phase = "calibration"))
                .await,
        );
    }

    /// One step per configured session count. Direct steps cool down in
    /// between so every count starts from a clean slate; the shared daemon
    /// is meant to stay warm.
    async fn scale(&self, mode: SessionMode, env: Option<&SharedDaemonEnv>) -> Vec<PhaseResult> {
        let mut results = Vec::with_capacity(self.config.session_counts.len());
        for (idx, &sessions) in self.config.session_counts.iter().enumerate() {
            if idx > 0 && mode == SessionMode::Direct {
                pause(self.config.pacing.cooldown()).await;
            }
            let result = self
                .step(mode, env, sessions, false)
                .instrument(info_span!("step", sessions))
                .await;
            results.push(result);
        }
        results
    }

    async fn calibrate(&self, env: &SharedDaemonEnv) -> Calibration {
        let sessions = self.config.calibration_count();
        info!(sessions, "calibrating private dirty memory");

        let direct = self.step(SessionMode::Direct, None, sessions, true).await;
        let shared = self.step(SessionMode::Relayed, Some(env), sessions, true).await;

        let calibration = Calibration {
            sessions,
            direct,
            shared,
        };
        info!(
            direct_ratio = calibration.direct_ratio(),
            shared_ratio = calibration.shared_ratio(),
            "calibration complete"
        );
        calibration
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
