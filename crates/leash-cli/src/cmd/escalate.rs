//! The three escalation verbs: stop, hard-stop, shutdown.
//!
//! Confirmation for the gated levels is checked here, before an executor is
//! even constructed — a blocked escalation must not touch the network. The
//! controller enforces the same gate again as its own invariant.

use crate::cmd::{self, TargetOverrides};
use crate::output::print_json;
use anyhow::bail;
use leash_core::killswitch::{EscalationLevel, KillState, KillSwitch, StopOutcome};
use leash_core::LeashError;
use std::path::Path;

pub fn stop(root: &Path, overrides: &TargetOverrides, json: bool) -> anyhow::Result<()> {
    let config = cmd::load_config(root, overrides)?;
    let exec = cmd::executor(&config)?;
    let outcome = cmd::block_on(async {
        let mut ks = KillSwitch::new(&exec, &config);
        ks.graceful_stop().await
    })??;
    render(&outcome, json)
}

pub fn hard_stop(
    root: &Path,
    overrides: &TargetOverrides,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = cmd::load_config(root, overrides)?;
    if !yes {
        return Err(LeashError::EscalationBlocked(EscalationLevel::HardKill.to_string()).into());
    }
    let exec = cmd::executor(&config)?;
    let outcome = cmd::block_on(async {
        let mut ks = KillSwitch::new(&exec, &config);
        ks.hard_kill(true).await
    })??;
    render(&outcome, json)
}

pub fn shutdown(
    root: &Path,
    overrides: &TargetOverrides,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = cmd::load_config(root, overrides)?;
    if !yes {
        return Err(
            LeashError::EscalationBlocked(EscalationLevel::HostShutdown.to_string()).into(),
        );
    }
    let exec = cmd::executor(&config)?;
    let outcome = cmd::block_on(async {
        let mut ks = KillSwitch::new(&exec, &config);
        ks.host_shutdown(true).await
    })??;
    render(&outcome, json)
}

fn render(outcome: &StopOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(outcome)?;
    } else {
        println!("state: {}", outcome.state);
        println!("{}", outcome.detail);
    }
    match outcome.state {
        KillState::Failed => bail!("{}", outcome.detail),
        // An unconfirmed graceful stop is an unresolved failure: the
        // operator asked for stopped and the target is not.
        state if !state.is_terminal() && !outcome.verified => bail!("{}", outcome.detail),
        _ => Ok(()),
    }
}
