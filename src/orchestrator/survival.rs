//! Survival and reconnect scenario against the shared daemon.
//!
//! ```text
//! A: open, handshake, call          (cold)
//! B: open, handshake                (warm)
//! close A, pause
//! B: call                           -> survival_ok
//! close B, pause                   (even if B failed)
//! C: open, handshake (timed), call  -> reconnect_ok, reconnect_time
//! ```

use tracing::{info, warn};

use crate::daemon::SharedDaemonEnv;
use crate::models::SurvivalResult;
use crate::orchestrator::scaling::{close_all, exercise};
use crate::orchestrator::{pause, Experiment};
use crate::session::{Session, SessionMode};
use crate::Result;

/// Request id of the cold session's correctness call.
pub const COLD_CALL_ID: u64 = 3;
/// Request id of the warm session's call after its sibling closed.
pub const SURVIVAL_CALL_ID: u64 = 20;
/// Request id of the reconnected session's call.
pub const RECONNECT_CALL_ID: u64 = 30;

impl Experiment {
    /// Run the survival scenario. The reconnect check runs even when the
    /// survival half fails; sessions still open on any exit path are
    /// closed before returning.
    pub(crate) async fn survival(&self, env: &SharedDaemonEnv) -> SurvivalResult {
        let mut result = SurvivalResult::default();
        let mut errors = Vec::new();
        let mut held = Vec::new();

        let survived = self.check_survival(env, &mut held).await;
        close_all(&self.launcher, std::mem::take(&mut held)).await;
        match survived {
            Ok(ok) => result.survival_ok = ok,
            Err(err) => {
                warn!(%err, "survival check failed");
                errors.push(err.to_string());
            }
        }
        pause(self.config.pacing.pause()).await;

        let reconnected = self.check_reconnect(env, &mut held, &mut result).await;
        close_all(&self.launcher, held).await;
        match reconnected {
            Ok(ok) => result.reconnect_ok = ok,
            Err(err) => {
                warn!(%err, "reconnect check failed");
                errors.push(err.to_string());
            }
        }

        if !errors.is_empty() {
            result.error = Some(errors.join("; "));
        }
        info!(
            survival_ok = result.survival_ok,
            reconnect_ok = result.reconnect_ok,
            reconnect_time = ?result.reconnect_time,
            "survival scenario finished"
        );
        result
    }

    /// Cold A and warm B; close A, then B must still answer.
    async fn check_survival(
        &self,
        env: &SharedDaemonEnv,
        held: &mut Vec<Session>,
    ) -> Result<bool> {
        let tool = self.config.probe_tool.as_str();
        let arguments = &self.config.probe_arguments;

        let mut cold = self.open(SessionMode::Relayed, Some(env))?;
        let cold_ready = exercise(&mut cold, tool, arguments, COLD_CALL_ID).await;
        held.push(cold);
        cold_ready?;

        let mut warm = self.open(SessionMode::Relayed, Some(env))?;
        let warm_ready = warm.handshake().await;
        held.push(warm);
        warm_ready?;

        // Held in open order: cold first.
        let cold = held.remove(0);
        self.launcher.close(cold).await;
        pause(self.config.pacing.pause()).await;

        match held.first_mut() {
            Some(warm) => warm.check_call(tool, arguments, SURVIVAL_CALL_ID).await,
            None => Ok(false),
        }
    }

    /// Fresh C after every relay closed; its handshake is the reconnect time.
    async fn check_reconnect(
        &self,
        env: &SharedDaemonEnv,
        held: &mut Vec<Session>,
        result: &mut SurvivalResult,
    ) -> Result<bool> {
        let mut fresh = self.open(SessionMode::Relayed, Some(env))?;
        let reconnect = fresh.handshake().await;
        held.push(fresh);
        result.reconnect_time = Some(reconnect?.elapsed);

        match held.first_mut() {
            Some(fresh) => {
                fresh
                    .check_call(
                        self.config.probe_tool.as_str(),
                        &self.config.probe_arguments,
                        RECONNECT_CALL_ID,
                    )
                    .await
            }
            None => Ok(false),
        }
    }
}
