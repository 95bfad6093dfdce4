//! Read-only health probing of the supervised host.
//!
//! One probe issues a fixed battery of remote queries — service state,
//! process snapshot, listening ports, disk usage, CPU temperature, free
//! memory — and assembles a point-in-time [`HealthReport`]. Collection is
//! best-effort per sub-check: a failure is recorded in the report's error
//! list and the remaining sub-checks still run. No retries happen inside a
//! single probe; the caller decides whether to probe again.

use crate::config::Config;
use crate::error::{LeashError, Result};
use crate::exec::Executor;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};

/// Parallel lightweight commands the target comfortably tolerates.
const PROBE_CONCURRENCY: usize = 4;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Unknown,
    Stopped,
    Running,
    Degraded,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Unknown => "unknown",
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
            ServiceState::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningPort {
    pub addr: String,
    pub port: u16,
}

/// A sub-check that could not be collected, by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFailure {
    pub check: String,
    pub error: String,
}

/// Point-in-time snapshot. Reports are never merged; callers compare whole
/// reports. Every sub-check is either populated or named in `errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub taken_at: DateTime<Utc>,
    pub service: ServiceState,
    pub processes: Vec<ProcessInfo>,
    pub ports: Vec<ListeningPort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_used_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_temp_celsius: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_available_bytes: Option<u64>,
    pub errors: Vec<CheckFailure>,
}

// ---------------------------------------------------------------------------
// HealthProbe
// ---------------------------------------------------------------------------

enum Sample {
    Service(ServiceState),
    Processes(Vec<ProcessInfo>),
    Ports(Vec<ListeningPort>),
    Disk(u8),
    Temp(f32),
    Mem(u64),
}

pub struct HealthProbe<'a> {
    exec: &'a dyn Executor,
    config: &'a Config,
}

impl<'a> HealthProbe<'a> {
    pub fn new(exec: &'a dyn Executor, config: &'a Config) -> Self {
        Self { exec, config }
    }

    /// Run the full battery and assemble a report. Never fails as a whole:
    /// sub-check errors land in `report.errors`.
    pub async fn probe(&self) -> HealthReport {
        let checks: Vec<(&str, BoxFuture<'_, Result<Sample>>)> = vec![
            ("service", Box::pin(async move { self.check_service().await.map(Sample::Service) })),
            ("processes", Box::pin(async move { self.check_processes().await.map(Sample::Processes) })),
            ("ports", Box::pin(async move { self.check_ports().await.map(Sample::Ports) })),
            ("disk", Box::pin(async move { self.check_disk().await.map(Sample::Disk) })),
            ("temperature", Box::pin(async move { self.check_temperature().await.map(Sample::Temp) })),
            ("memory", Box::pin(async move { self.check_memory().await.map(Sample::Mem) })),
        ];

        let results: Vec<(&str, Result<Sample>)> = futures::stream::iter(checks)
            .map(|(name, fut)| async move { (name, fut.await) })
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect()
            .await;

        let mut report = HealthReport {
            taken_at: Utc::now(),
            service: ServiceState::Unknown,
            processes: Vec::new(),
            ports: Vec::new(),
            disk_used_percent: None,
            cpu_temp_celsius: None,
            mem_available_bytes: None,
            errors: Vec::new(),
        };
        for (name, result) in results {
            match result {
                Ok(Sample::Service(s)) => report.service = s,
                Ok(Sample::Processes(p)) => report.processes = p,
                Ok(Sample::Ports(p)) => report.ports = p,
                Ok(Sample::Disk(d)) => report.disk_used_percent = Some(d),
                Ok(Sample::Temp(t)) => report.cpu_temp_celsius = Some(t),
                Ok(Sample::Mem(m)) => report.mem_available_bytes = Some(m),
                Err(e) => report.errors.push(CheckFailure {
                    check: name.to_string(),
                    error: e.to_string(),
                }),
            }
        }
        report
    }

    /// Just the service sub-check. Used by the kill switch to confirm a stop
    /// without paying for the full battery on every poll attempt.
    pub async fn service_state(&self) -> Result<ServiceState> {
        self.check_service().await
    }

    /// Just the process sub-check, for hard-kill verification.
    pub async fn matching_processes(&self) -> Result<Vec<ProcessInfo>> {
        self.check_processes().await
    }

    async fn check_service(&self) -> Result<ServiceState> {
        let command = format!(
            "systemctl --user is-active {}",
            self.config.service.unit
        );
        let out = self
            .exec
            .execute(&command, self.config.target.command_timeout())
            .await?;
        // is-active exits non-zero for every state but "active"; the state
        // name still arrives on stdout.
        Ok(parse_service_state(out.stdout_trimmed()))
    }

    async fn check_processes(&self) -> Result<Vec<ProcessInfo>> {
        let command = format!("pgrep -af -- {}", shell_quote(&self.config.service.process_pattern));
        let out = self
            .exec
            .execute(&command, self.config.target.command_timeout())
            .await?;
        // pgrep exits 1 when nothing matched — that is an answer, not a failure.
        if out.exit_code == 1 {
            return Ok(Vec::new());
        }
        if !out.success() {
            return Err(LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(parse_processes(&out.stdout))
    }

    async fn check_ports(&self) -> Result<Vec<ListeningPort>> {
        let out = self
            .exec
            .execute("ss -Htln", self.config.target.command_timeout())
            .await?;
        if !out.success() {
            return Err(LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(parse_ports(&out.stdout))
    }

    async fn check_disk(&self) -> Result<u8> {
        let out = self
            .exec
            .execute("df --output=pcent /", self.config.target.command_timeout())
            .await?;
        if !out.success() {
            return Err(LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        parse_disk_percent(&out.stdout)
            .ok_or_else(|| LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: format!("unparsable df output: {}", out.stdout.trim()),
            })
    }

    /// `vcgencmd` exists on Raspberry Pi OS; fall back to the generic sysfs
    /// thermal zone on other hosts.
    async fn check_temperature(&self) -> Result<f32> {
        let timeout = self.config.target.command_timeout();
        if let Ok(out) = self.exec.execute("vcgencmd measure_temp", timeout).await {
            if out.success() {
                if let Some(t) = parse_vcgencmd_temp(&out.stdout) {
                    return Ok(t);
                }
            }
        }
        let out = self
            .exec
            .execute("cat /sys/class/thermal/thermal_zone0/temp", timeout)
            .await?;
        if !out.success() {
            return Err(LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        parse_thermal_zone(&out.stdout)
            .ok_or_else(|| LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: format!("unparsable thermal zone reading: {}", out.stdout.trim()),
            })
    }

    async fn check_memory(&self) -> Result<u64> {
        let out = self
            .exec
            .execute("free -b", self.config.target.command_timeout())
            .await?;
        if !out.success() {
            return Err(LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        parse_mem_available(&out.stdout)
            .ok_or_else(|| LeashError::RemoteCommand {
                code: out.exit_code,
                stderr: format!("unparsable free output: {}", out.stdout.trim()),
            })
    }
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

fn parse_service_state(stdout: &str) -> ServiceState {
    match stdout {
        "active" => ServiceState::Running,
        "inactive" | "dead" => ServiceState::Stopped,
        "failed" => ServiceState::Degraded,
        _ => ServiceState::Unknown,
    }
}

/// `pgrep -af` lines: `<pid> <full command line>`.
fn parse_processes(stdout: &str) -> Vec<ProcessInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let (pid, command) = line.trim().split_once(' ')?;
            Some(ProcessInfo {
                pid: pid.parse().ok()?,
                command: command.to_string(),
            })
        })
        .collect()
}

/// `ss -Htln` lines: `LISTEN 0 128 0.0.0.0:22 0.0.0.0:*`.
fn parse_ports(stdout: &str) -> Vec<ListeningPort> {
    stdout
        .lines()
        .filter_map(|line| {
            let local = line.split_whitespace().nth(3)?;
            let (addr, port) = local.rsplit_once(':')?;
            Some(ListeningPort {
                addr: addr.to_string(),
                port: port.parse().ok()?,
            })
        })
        .collect()
}

/// `df --output=pcent /` — header line, then ` 43%`.
fn parse_disk_percent(stdout: &str) -> Option<u8> {
    stdout
        .lines()
        .nth(1)?
        .trim()
        .trim_end_matches('%')
        .parse()
        .ok()
}

/// `vcgencmd measure_temp` — `temp=48.3'C`.
fn parse_vcgencmd_temp(stdout: &str) -> Option<f32> {
    let re = regex::Regex::new(r"temp=([0-9.]+)").ok()?;
    re.captures(stdout)?.get(1)?.as_str().parse().ok()
}

/// Sysfs thermal zone reading in millidegrees.
fn parse_thermal_zone(stdout: &str) -> Option<f32> {
    let millis: f32 = stdout.trim().parse().ok()?;
    Some(millis / 1000.0)
}

/// `free -b` — the `Mem:` row's `available` column (last field).
fn parse_mem_available(stdout: &str) -> Option<u64> {
    let row = stdout.lines().find(|l| l.starts_with("Mem:"))?;
    row.split_whitespace().last()?.parse().ok()
}

/// Single-quote an argument for the remote shell.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
