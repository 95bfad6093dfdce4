//! Remote command execution over ssh.
//!
//! Everything the control plane does on the target flows through the
//! [`Executor`] trait: probes and the kill switch never spawn processes
//! themselves. The production implementation shells out to the OpenSSH
//! client in batch mode; tests drive the same components through a scripted
//! in-memory executor.
//!
//! Transport semantics: ssh reserves exit code 255 for its own failures
//! (unreachable host, rejected auth). That maps to `Connection` and earns
//! exactly one retry — the remote side never ran the command. Any other exit
//! code means the remote side did run it, so the output is returned as-is
//! and never retried. A command with no response inside its deadline maps to
//! `Timeout` (completion is ambiguous) and is never retried either.

use crate::config::Target;
use crate::error::{LeashError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Collected result of one remote command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with trailing whitespace stripped — the usual shape for
    /// single-line command output like `systemctl is-active`.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim_end()
    }
}

/// Run a command on the remote host and collect its output.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<ExecOutput>;

    /// Like [`Executor::execute`], feeding `input` to the remote command's
    /// stdin. Used for the secret-injection start path; `input` is never
    /// logged by implementations.
    async fn execute_with_input(
        &self,
        command: &str,
        input: &[u8],
        timeout: Duration,
    ) -> Result<ExecOutput>;
}

// ---------------------------------------------------------------------------
// SshExecutor
// ---------------------------------------------------------------------------

/// Production executor backed by the `ssh` binary.
pub struct SshExecutor {
    target: Target,
    ssh_bin: PathBuf,
}

impl SshExecutor {
    pub fn new(target: Target) -> Result<Self> {
        let ssh_bin = which::which("ssh").map_err(|_| LeashError::SshNotInstalled)?;
        Ok(Self { target, ssh_bin })
    }

    fn build_command(&self, command: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.ssh_bin);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.target.connect_timeout_secs))
            .arg("-p")
            .arg(self.target.port.to_string());
        if let Some(identity) = self.target.identity_file() {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(self.target.destination()).arg("--").arg(command);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_once(
        &self,
        command: &str,
        input: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ExecOutput> {
        tracing::debug!(host = %self.target.host, command, "remote exec");
        let mut child = self.build_command(command).spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Some(data) = input {
                stdin.write_all(data).await?;
            }
            // Dropping stdin closes it so the remote command sees EOF.
            drop(stdin);
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| LeashError::Timeout {
                command: command.to_string(),
                timeout_secs: timeout.as_secs(),
            })??;

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if exit_code == 255 {
            return Err(LeashError::Connection(stderr.trim().to_string()));
        }
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            exit_code,
        })
    }
}

#[async_trait]
impl Executor for SshExecutor {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<ExecOutput> {
        match self.run_once(command, None, timeout).await {
            Err(LeashError::Connection(first)) => {
                tracing::warn!(host = %self.target.host, error = %first, "connection failed, retrying once");
                self.run_once(command, None, timeout).await
            }
            other => other,
        }
    }

    async fn execute_with_input(
        &self,
        command: &str,
        input: &[u8],
        timeout: Duration,
    ) -> Result<ExecOutput> {
        match self.run_once(command, Some(input), timeout).await {
            Err(LeashError::Connection(first)) => {
                tracing::warn!(host = %self.target.host, error = %first, "connection failed, retrying once");
                self.run_once(command, Some(input), timeout).await
            }
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted executor (test double)
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
