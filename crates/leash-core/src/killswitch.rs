//! The kill switch: an escalating shutdown state machine for the remote
//! agent.
//!
//! One controller instance per target per invocation; mutating transitions
//! are strictly sequential. Escalation only moves forward inside a session:
//!
//!   RUNNING → GRACEFUL_STOP → HARD_KILL → (any) → HOST_SHUTDOWN
//!
//! with STOPPED as the success terminal. FAILED (a hard kill that left
//! survivors) accepts exactly one further escalation, host shutdown; a
//! session that reached STOPPED is over. Every escalation past graceful is
//! gated on explicit operator confirmation — the health probe is a
//! verification oracle only and never triggers escalation by itself. A
//! transport failure during a transition leaves the controller in its
//! pre-transition state; "target already in desired state" is success.

use crate::config::Config;
use crate::error::{LeashError, Result};
use crate::exec::Executor;
use crate::health::{HealthProbe, HealthReport, ServiceState, shell_quote};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Ordered escalation levels. Monotonic within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Running,
    GracefulStop,
    HardKill,
    HostShutdown,
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EscalationLevel::Running => "running",
            EscalationLevel::GracefulStop => "graceful-stop",
            EscalationLevel::HardKill => "hard-kill",
            EscalationLevel::HostShutdown => "host-shutdown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillState {
    Running,
    GracefulStop,
    HardKill,
    HostShutdown,
    Stopped,
    Failed,
}

impl KillState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, KillState::Stopped | KillState::Failed)
    }

    fn level(&self) -> Option<EscalationLevel> {
        match self {
            KillState::Running => Some(EscalationLevel::Running),
            KillState::GracefulStop => Some(EscalationLevel::GracefulStop),
            KillState::HardKill => Some(EscalationLevel::HardKill),
            KillState::HostShutdown => Some(EscalationLevel::HostShutdown),
            KillState::Stopped | KillState::Failed => None,
        }
    }
}

impl std::fmt::Display for KillState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KillState::Running => "running",
            KillState::GracefulStop => "graceful-stop",
            KillState::HardKill => "hard-kill",
            KillState::HostShutdown => "host-shutdown",
            KillState::Stopped => "stopped",
            KillState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of one transition attempt.
#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub state: KillState,
    /// The target was already in the desired state; nothing was issued.
    pub already_stopped: bool,
    /// The health probe confirmed the outcome. False for the optimistic
    /// host-shutdown terminal and for an unconfirmed graceful stop.
    pub verified: bool,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct KillSwitch<'a> {
    exec: &'a dyn Executor,
    config: &'a Config,
    state: KillState,
}

impl<'a> KillSwitch<'a> {
    /// A fresh session, starting at RUNNING. Resetting after a manual
    /// restart means constructing a new controller, never stepping back.
    pub fn new(exec: &'a dyn Executor, config: &'a Config) -> Self {
        Self {
            exec,
            config,
            state: KillState::Running,
        }
    }

    pub fn state(&self) -> KillState {
        self.state
    }

    /// Read-only status snapshot. Never mutates the session.
    pub async fn status(&self) -> HealthReport {
        HealthProbe::new(self.exec, self.config).probe().await
    }

    fn probe(&self) -> HealthProbe<'a> {
        HealthProbe::new(self.exec, self.config)
    }

    fn ensure_forward(&self, to: EscalationLevel) -> Result<()> {
        // A failed hard kill leaves no cleaner option than powering off.
        if self.state == KillState::Failed && to == EscalationLevel::HostShutdown {
            return Ok(());
        }
        match self.state.level() {
            None => Err(LeashError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
                reason: "session already reached a terminal state".to_string(),
            }),
            Some(current) if to <= current => Err(LeashError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
                reason: "escalation only moves forward within a session".to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    /// RUNNING → GRACEFUL_STOP: ask the service manager to stop the unit,
    /// then poll the health probe (bounded attempts, linear backoff) until
    /// the service no longer reports running. Unconfirmed after the attempt
    /// budget leaves the session at GRACEFUL_STOP, eligible for hard-kill.
    pub async fn graceful_stop(&mut self) -> Result<StopOutcome> {
        self.ensure_forward(EscalationLevel::GracefulStop)?;

        let probe = self.probe();
        if probe.service_state().await? != ServiceState::Running {
            self.state = KillState::Stopped;
            return Ok(StopOutcome {
                state: self.state,
                already_stopped: true,
                verified: true,
                detail: "service already stopped".to_string(),
            });
        }

        let command = format!("systemctl --user stop {}", self.config.service.unit);
        let out = self.exec.execute(&command, self.config.target.command_timeout()).await?;
        if !out.success() {
            return Err(LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        self.state = KillState::GracefulStop;
        tracing::info!(unit = %self.config.service.unit, "stop issued, polling for confirmation");

        for attempt in 1..=self.config.poll.attempts {
            tokio::time::sleep(Duration::from_secs(
                self.config.poll.interval_secs * u64::from(attempt),
            ))
            .await;
            if probe.service_state().await? != ServiceState::Running {
                self.state = KillState::Stopped;
                return Ok(StopOutcome {
                    state: self.state,
                    already_stopped: false,
                    verified: true,
                    detail: format!("service stopped (confirmed on poll attempt {attempt})"),
                });
            }
        }

        Ok(StopOutcome {
            state: self.state,
            already_stopped: false,
            verified: false,
            detail: format!(
                "service still running after {} poll attempts; escalate with hard-stop",
                self.config.poll.attempts
            ),
        })
    }

    /// → HARD_KILL: SIGTERM all matching processes, wait the grace period,
    /// SIGKILL survivors, then verify via the process snapshot. Requires
    /// explicit operator confirmation before any remote command is issued.
    pub async fn hard_kill(&mut self, confirmed: bool) -> Result<StopOutcome> {
        if !confirmed {
            return Err(LeashError::EscalationBlocked(
                EscalationLevel::HardKill.to_string(),
            ));
        }
        self.ensure_forward(EscalationLevel::HardKill)?;

        let probe = self.probe();
        if probe.matching_processes().await?.is_empty() {
            self.state = KillState::Stopped;
            return Ok(StopOutcome {
                state: self.state,
                already_stopped: true,
                verified: true,
                detail: "no matching processes".to_string(),
            });
        }

        let pattern = shell_quote(&self.config.service.process_pattern);
        self.signal_matching("TERM", &pattern).await?;
        self.state = KillState::HardKill;
        tracing::info!(grace_secs = self.config.hard_kill.grace_secs, "SIGTERM sent, waiting grace period");

        tokio::time::sleep(Duration::from_secs(self.config.hard_kill.grace_secs)).await;
        self.signal_matching("KILL", &pattern).await?;

        let survivors = probe.matching_processes().await?;
        if survivors.is_empty() {
            self.state = KillState::Stopped;
            Ok(StopOutcome {
                state: self.state,
                already_stopped: false,
                verified: true,
                detail: "all matching processes terminated".to_string(),
            })
        } else {
            self.state = KillState::Failed;
            tracing::warn!(survivors = survivors.len(), "processes survived SIGKILL");
            Ok(StopOutcome {
                state: self.state,
                already_stopped: false,
                verified: false,
                detail: format!("{} matching processes survived SIGKILL", survivors.len()),
            })
        }
    }

    /// → HOST_SHUTDOWN: power the host off. Fire-and-forget — completion
    /// cannot be verified over the severed connection, so the session ends
    /// at STOPPED optimistically once the remote side accepts the command.
    pub async fn host_shutdown(&mut self, confirmed: bool) -> Result<StopOutcome> {
        if !confirmed {
            return Err(LeashError::EscalationBlocked(
                EscalationLevel::HostShutdown.to_string(),
            ));
        }
        self.ensure_forward(EscalationLevel::HostShutdown)?;

        let out = self
            .exec
            .execute("sudo shutdown -h now", self.config.target.command_timeout())
            .await?;
        if !out.success() {
            return Err(LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        self.state = KillState::Stopped;
        tracing::info!(host = %self.config.target.host, "power-off accepted");
        Ok(StopOutcome {
            state: self.state,
            already_stopped: false,
            verified: false,
            detail: "power-off accepted; connection to the host will drop".to_string(),
        })
    }

    async fn signal_matching(&self, signal: &str, pattern: &str) -> Result<()> {
        let command = format!("pkill -{signal} -f -- {pattern}");
        let out = self.exec.execute(&command, self.config.target.command_timeout()).await?;
        // pkill exits 1 when nothing matched — already gone is fine here.
        if out.exit_code > 1 {
            return Err(LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
