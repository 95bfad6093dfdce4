//! Drift auditing of the remote agent's governing configuration files.
//!
//! Each tracked file's current remote content hash (`sha256sum`) is compared
//! against the last accepted baseline. Classification per file:
//!   no baseline                     → new
//!   baseline present, file absent   → missing
//!   hash mismatch                   → modified
//!   hash match                      → unchanged
//!
//! Auditing is read-only; accepting a new baseline is a separate explicit
//! operation on [`BaselineStore`].

use crate::baseline::BaselineStore;
use crate::config::Config;
use crate::error::{LeashError, Result};
use crate::exec::Executor;
use crate::health::shell_quote;
use futures::stream::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

/// Parallel hash fetches, same bound as the health battery.
const AUDIT_CONCURRENCY: usize = 4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftClass {
    Unchanged,
    Modified,
    Missing,
    New,
}

impl std::fmt::Display for DriftClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DriftClass::Unchanged => "unchanged",
            DriftClass::Modified => "modified",
            DriftClass::Missing => "missing",
            DriftClass::New => "new",
        };
        f.write_str(s)
    }
}

/// Derived per audit, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<String>,
    pub classification: DriftClass,
}

// ---------------------------------------------------------------------------
// DriftAuditor
// ---------------------------------------------------------------------------

pub struct DriftAuditor<'a> {
    exec: &'a dyn Executor,
    config: &'a Config,
}

impl<'a> DriftAuditor<'a> {
    pub fn new(exec: &'a dyn Executor, config: &'a Config) -> Self {
        Self { exec, config }
    }

    /// Audit every tracked file against the baseline store. Transport
    /// failures abort the audit; an absent remote file does not.
    pub async fn audit(&self, store: &BaselineStore) -> Result<Vec<DriftEntry>> {
        let baselines = store.load()?;
        futures::stream::iter(self.config.tracked_files.iter())
            .map(|path| {
                let baseline_hash = baselines.get(path).map(|b| b.hash.clone());
                async move {
                    let current_hash = self.current_hash(path).await?;
                    Ok(classify(path, baseline_hash, current_hash))
                }
            })
            .buffered(AUDIT_CONCURRENCY)
            .try_collect()
            .await
    }

    /// Fetch the current remote content hash for one tracked file.
    /// `Ok(None)` means the file does not exist on the target.
    pub async fn current_hash(&self, path: &str) -> Result<Option<String>> {
        let command = format!("sha256sum -- {}", remote_path_expr(path));
        let out = self
            .exec
            .execute(&command, self.config.target.command_timeout())
            .await?;
        if out.success() {
            return Ok(parse_sha256_line(&out.stdout));
        }
        if out.stderr.contains("No such file") {
            return Ok(None);
        }
        Err(LeashError::RemoteCommand {
            code: out.exit_code,
            stderr: out.stderr.trim().to_string(),
        })
    }
}

fn classify(path: &str, baseline_hash: Option<String>, current_hash: Option<String>) -> DriftEntry {
    let classification = match (&baseline_hash, &current_hash) {
        (None, _) => DriftClass::New,
        (Some(_), None) => DriftClass::Missing,
        (Some(b), Some(c)) if b == c => DriftClass::Unchanged,
        (Some(_), Some(_)) => DriftClass::Modified,
    };
    DriftEntry {
        path: path.to_string(),
        baseline_hash,
        current_hash,
        classification,
    }
}

/// `sha256sum` output: `<hex>  <path>`.
fn parse_sha256_line(stdout: &str) -> Option<String> {
    stdout
        .split_whitespace()
        .next()
        .filter(|h| h.len() == 64)
        .map(str::to_string)
}

/// Tracked paths use `~/` for the remote home. Quoting the whole path would
/// defeat tilde expansion in the remote shell, so rewrite it to `$HOME`.
fn remote_path_expr(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        format!("\"$HOME/{rest}\"")
    } else {
        shell_quote(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::exec::scripted::{Response, ScriptedExecutor};
    use tempfile::TempDir;

    const H0: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const H1: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn single_file_config(path: &str) -> Config {
        let mut c = config::template();
        c.tracked_files = vec![path.to_string()];
        c
    }

    #[test]
    fn remote_path_expr_expands_tilde() {
        assert_eq!(
            remote_path_expr("~/.config/agent/agent.yaml"),
            "\"$HOME/.config/agent/agent.yaml\""
        );
        assert_eq!(remote_path_expr("/etc/agent.yaml"), "'/etc/agent.yaml'");
    }

    #[test]
    fn parse_sha256_extracts_hash() {
        let line = format!("{H0}  /home/agent/.config/agent/agent.yaml\n");
        assert_eq!(parse_sha256_line(&line).as_deref(), Some(H0));
        assert_eq!(parse_sha256_line("sha256sum: error"), None);
    }

    #[tokio::test]
    async fn no_baseline_classifies_as_new() {
        let dir = TempDir::new().unwrap();
        let exec = ScriptedExecutor::new();
        exec.on_ok("sha256sum", &format!("{H0}  f\n"));

        let config = single_file_config("~/f");
        let auditor = DriftAuditor::new(&exec, &config);
        let entries = auditor.audit(&BaselineStore::new(dir.path())).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].classification, DriftClass::New);
        assert_eq!(entries[0].current_hash.as_deref(), Some(H0));
    }

    #[tokio::test]
    async fn matching_hash_is_unchanged_and_mismatch_is_modified() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());
        store.accept("~/f", H0).unwrap();

        let config = single_file_config("~/f");

        let exec = ScriptedExecutor::new();
        exec.on_ok("sha256sum", &format!("{H0}  f\n"));
        let entries = DriftAuditor::new(&exec, &config).audit(&store).await.unwrap();
        assert_eq!(entries[0].classification, DriftClass::Unchanged);

        // A single-byte remote change yields a different hash.
        let exec = ScriptedExecutor::new();
        exec.on_ok("sha256sum", &format!("{H1}  f\n"));
        let entries = DriftAuditor::new(&exec, &config).audit(&store).await.unwrap();
        assert_eq!(entries[0].classification, DriftClass::Modified);
        assert_eq!(entries[0].baseline_hash.as_deref(), Some(H0));
        assert_eq!(entries[0].current_hash.as_deref(), Some(H1));
    }

    #[tokio::test]
    async fn baselined_file_absent_remotely_is_missing() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());
        store.accept("~/f", H0).unwrap();

        let exec = ScriptedExecutor::new();
        exec.on_exit("sha256sum", 1, "sha256sum: f: No such file or directory");

        let config = single_file_config("~/f");
        let entries = DriftAuditor::new(&exec, &config).audit(&store).await.unwrap();
        assert_eq!(entries[0].classification, DriftClass::Missing);
        assert!(entries[0].current_hash.is_none());
    }

    #[tokio::test]
    async fn accept_then_reaudit_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());
        store.accept("~/f", H0).unwrap();

        let exec = ScriptedExecutor::new();
        exec.on_ok("sha256sum", &format!("{H1}  f\n"));
        let config = single_file_config("~/f");
        let auditor = DriftAuditor::new(&exec, &config);

        let entries = auditor.audit(&store).await.unwrap();
        assert_eq!(entries[0].classification, DriftClass::Modified);

        // Operator accepts the new content; the same remote hash now matches.
        store.accept("~/f", H1).unwrap();
        let entries = auditor.audit(&store).await.unwrap();
        assert_eq!(entries[0].classification, DriftClass::Unchanged);
    }

    #[tokio::test]
    async fn transport_failure_aborts_audit() {
        let dir = TempDir::new().unwrap();
        let exec = ScriptedExecutor::new();
        exec.on("sha256sum", Response::Connection("No route to host".into()));

        let config = single_file_config("~/f");
        let err = DriftAuditor::new(&exec, &config)
            .audit(&BaselineStore::new(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, LeashError::Connection(_)));
    }

    #[tokio::test]
    async fn audit_does_not_write_baselines() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());

        let exec = ScriptedExecutor::new();
        exec.on_ok("sha256sum", &format!("{H0}  f\n"));
        let config = single_file_config("~/f");
        DriftAuditor::new(&exec, &config).audit(&store).await.unwrap();

        // Still no baseline recorded for the new file.
        assert!(store.get("~/f").unwrap().is_none());
    }
}
