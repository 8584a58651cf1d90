//! Scaling steps: open N sessions, prove each works, measure, close.
//!
//! Sessions are opened one after another. Every opened session is closed
//! again whatever the step's outcome; the measurement itself happens while
//! all N are alive.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::daemon::SharedDaemonEnv;
use crate::models::PhaseResult;
use crate::orchestrator::{pause, Experiment};
use crate::probe::ProbeTarget;
use crate::session::{Session, SessionLauncher, SessionMode};
use crate::{AppError, Result};

/// Request id of the first session's correctness call; later sessions
/// count up from here.
pub const FIRST_STEP_CALL_ID: u64 = 10;

impl Experiment {
    /// Run one scaling step of `sessions` sessions under `mode`.
    ///
    /// Relayed steps need `env`. With `with_dirty` the private-dirty probe
    /// runs as well.
    pub(crate) async fn step(
        &self,
        mode: SessionMode,
        env: Option<&SharedDaemonEnv>,
        sessions: usize,
        with_dirty: bool,
    ) -> PhaseResult {
        let mut opened = Vec::with_capacity(sessions);
        let outcome = self
            .run_step(mode, env, sessions, with_dirty, &mut opened)
            .await;
        close_all(&self.launcher, opened).await;

        match outcome {
            Ok(result) => {
                info!(
                    %mode,
                    sessions,
                    rss_kb = result.rss_kb,
                    dirty_kb = result.dirty_kb,
                    ok = result.ok,
                    "step measured"
                );
                result
            }
            Err(err) => {
                warn!(%mode, sessions, %err, "step failed");
                PhaseResult::failed(sessions, err.to_string())
            }
        }
    }

    async fn run_step(
        &self,
        mode: SessionMode,
        env: Option<&SharedDaemonEnv>,
        sessions: usize,
        with_dirty: bool,
        opened: &mut Vec<Session>,
    ) -> Result<PhaseResult> {
        let mut times = Vec::with_capacity(sessions);
        let mut all_ok = true;

        for (_, id) in (0..sessions).zip(FIRST_STEP_CALL_ID..) {
            let mut session = self.open(mode, env)?;
            let checked = exercise(
                &mut session,
                &self.config.probe_tool,
                &self.config.probe_arguments,
                id,
            )
            .await;
            opened.push(session);

            let (elapsed, ok) = checked?;
            times.push(elapsed);
            all_ok &= ok;
        }

        pause(self.config.pacing.settle()).await;

        let targets = self.targets(mode, env, opened);
        let sample = self.probe.measure(&targets, with_dirty).await;
        Ok(PhaseResult::measured(sessions, sample, times, all_ok))
    }

    pub(crate) fn open(&self, mode: SessionMode, env: Option<&SharedDaemonEnv>) -> Result<Session> {
        match (mode, env) {
            (SessionMode::Direct, _) => self.launcher.open_direct(),
            (SessionMode::Relayed, Some(env)) => self.launcher.open_relayed(env.env_vars()),
            (SessionMode::Relayed, None) => Err(AppError::Config(
                "relayed sessions need a shared daemon environment".into(),
            )),
        }
    }

    /// Direct sessions are measured as whole trees. Relays are measured
    /// alone, with the daemon's tree added once.
    fn targets(
        &self,
        mode: SessionMode,
        env: Option<&SharedDaemonEnv>,
        opened: &[Session],
    ) -> Vec<ProbeTarget> {
        match mode {
            SessionMode::Direct => opened.iter().map(|s| ProbeTarget::Tree(s.pid())).collect(),
            SessionMode::Relayed => {
                let mut targets: Vec<ProbeTarget> =
                    opened.iter().map(|s| ProbeTarget::Single(s.pid())).collect();
                match env.and_then(SharedDaemonEnv::daemon_pid) {
                    Some(daemon) => targets.push(ProbeTarget::Tree(daemon)),
                    None => warn!(
                        pid_file = %self.config.daemon.pid_file,
                        "daemon pid unknown, measuring relays only"
                    ),
                }
                targets
            }
        }
    }
}

/// Handshake, then one correctness call. Returns the handshake latency and
/// whether the call succeeded.
///
/// # Errors
///
/// Returns any handshake failure and any transport failure of the call.
pub(crate) async fn exercise(
    session: &mut Session,
    tool: &str,
    arguments: &Value,
    id: u64,
) -> Result<(Duration, bool)> {
    let handshake = session.handshake().await?;
    let ok = session.check_call(tool, arguments, id).await?;
    Ok((handshake.elapsed, ok))
}

/// Close every session in `sessions`, in open order.
pub(crate) async fn close_all(launcher: &SessionLauncher, sessions: Vec<Session>) {
    for session in sessions {
        launcher.close(session).await;
    }
}
