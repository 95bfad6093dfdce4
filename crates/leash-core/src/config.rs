//! Control-plane configuration.
//!
//! Layout:
//!   .leash/config.yaml — target endpoint, remote service identity, tracked
//!                        files, and escalation tuning.
//!
//! Everything a component needs arrives explicitly through this struct at
//! construction time; nothing reads ambient environment variables at depth.
//! Flag/env overrides are applied once by the CLI via `apply_overrides`.

use crate::error::{LeashError, Result};
use crate::io;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// The supervised endpoint. Immutable for the lifetime of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Private key for ssh auth (default: ~/.ssh/id_ed25519 or ~/.ssh/id_rsa).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

impl Target {
    /// `user@host` form accepted by ssh.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Resolve the identity file: explicit config value, else the first of
    /// `~/.ssh/id_ed25519`, `~/.ssh/id_rsa` that exists.
    pub fn identity_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.identity {
            return Some(path.clone());
        }
        let home = home::home_dir()?;
        let candidates = [
            home.join(".ssh").join("id_ed25519"),
            home.join(".ssh").join("id_rsa"),
        ];
        candidates.into_iter().find(|p| p.exists())
    }
}

// ---------------------------------------------------------------------------
// Service / escalation tuning
// ---------------------------------------------------------------------------

/// Identity of the remote agent process: the systemd user unit it runs under,
/// the pgrep pattern that matches its processes, and the command the remote
/// launcher execs at start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_unit")]
    pub unit: String,
    pub process_pattern: String,
    #[serde(default = "default_launch_command")]
    pub launch_command: String,
}

fn default_unit() -> String {
    "agent.service".to_string()
}

fn default_launch_command() -> String {
    "agent run".to_string()
}

/// Bounded health poll used to confirm a graceful stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_attempts")]
    pub attempts: u32,
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

fn default_poll_attempts() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    2
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: default_poll_attempts(),
            interval_secs: default_poll_interval(),
        }
    }
}

/// SIGTERM → grace period → SIGKILL tuning for the hard-kill transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardKillConfig {
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
}

fn default_grace() -> u64 {
    5
}

impl Default for HardKillConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub target: Target,
    pub service: ServiceConfig,
    /// Remote file paths whose content hashes the drift auditor tracks.
    #[serde(default)]
    pub tracked_files: Vec<String>,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub hard_kill: HardKillConfig,
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(LeashError::NotInitialized);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let content = serde_yaml::to_string(self)?;
        io::atomic_write(&path, content.as_bytes())
    }

    /// Apply flag/env overrides on top of the file-loaded target.
    pub fn apply_overrides(&mut self, host: Option<&str>, user: Option<&str>, port: Option<u16>) {
        if let Some(h) = host {
            self.target.host = h.to_string();
        }
        if let Some(u) = user {
            self.target.user = u.to_string();
        }
        if let Some(p) = port {
            self.target.port = p;
        }
    }
}

/// Starter config written by `leash init`.
pub fn template() -> Config {
    Config {
        target: Target {
            host: "agent-host.local".to_string(),
            user: "agent".to_string(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            identity: None,
        },
        service: ServiceConfig {
            unit: default_unit(),
            process_pattern: "agent".to_string(),
            launch_command: default_launch_command(),
        },
        tracked_files: vec![
            "~/.config/agent/agent.yaml".to_string(),
            "~/.config/agent/SOUL.md".to_string(),
        ],
        poll: PollConfig::default(),
        hard_kill: HardKillConfig::default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
