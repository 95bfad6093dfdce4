//! Periodic review: one composed report over health, drift, and secret
//! resolvability. A thin composition layer — each section is produced by
//! the component that owns it.

use crate::baseline::BaselineStore;
use crate::config::Config;
use crate::drift::{DriftAuditor, DriftEntry};
use crate::error::Result;
use crate::exec::Executor;
use crate::health::{HealthProbe, HealthReport};
use crate::secrets::{self, Manifest, RefCheck, SecretStore};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    pub taken_at: DateTime<Utc>,
    pub health: HealthReport,
    pub drift: Vec<DriftEntry>,
    pub secrets: Vec<RefCheck>,
}

impl ReviewReport {
    /// True when nothing needs operator attention.
    pub fn clean(&self) -> bool {
        self.health.errors.is_empty()
            && self
                .drift
                .iter()
                .all(|d| d.classification == crate::drift::DriftClass::Unchanged)
            && self.secrets.iter().all(|s| s.ok)
    }
}

/// Collect the full review. Health collection is best-effort; drift
/// transport failures and credential rejections abort the review.
pub async fn review(
    exec: &dyn Executor,
    config: &Config,
    store: &BaselineStore,
    secret_store: &dyn SecretStore,
    manifest: &Manifest,
) -> Result<ReviewReport> {
    let health = HealthProbe::new(exec, config).probe().await;
    let drift = DriftAuditor::new(exec, config).audit(store).await?;
    let secrets = secrets::check(secret_store, manifest)?;
    Ok(ReviewReport {
        taken_at: Utc::now(),
        health,
        drift,
        secrets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::drift::DriftClass;
    use crate::error::LeashError;
    use crate::exec::scripted::ScriptedExecutor;
    use crate::secrets::{SecretRef, SecretValue};
    use tempfile::TempDir;

    struct OneVaultStore;

    impl SecretStore for OneVaultStore {
        fn list_vaults(&self) -> Result<Vec<String>> {
            Ok(vec!["agent".to_string()])
        }

        fn read(&self, reference: &SecretRef) -> Result<SecretValue> {
            if reference.item == "present" {
                Ok(SecretValue::new("value-1".into()))
            } else {
                Err(LeashError::SecretUnavailable {
                    reference: reference.uri(),
                    reason: "item not found".into(),
                })
            }
        }
    }

    const H0: &str = "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";

    #[tokio::test]
    async fn review_composes_all_three_sections() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());
        store.accept("~/f", H0).unwrap();

        let exec = ScriptedExecutor::new();
        exec.on_ok("systemctl --user is-active", "active\n");
        exec.on_ok("sha256sum", &format!("{H0}  f\n"));
        exec.on_ok("df --output=pcent", "Use%\n 20%\n");
        exec.on_ok("vcgencmd measure_temp", "temp=45.0'C\n");
        exec.on_ok("free -b", "x\nMem: 4 1 1 0 2 99\n");
        exec.on_exit("pgrep -af", 1, "");

        let mut config = config::template();
        config.tracked_files = vec!["~/f".to_string()];

        let manifest =
            Manifest::parse("GOOD: op://agent/present/f\nBAD: op://agent/absent/f\n").unwrap();
        let report = review(&exec, &config, &store, &OneVaultStore, &manifest)
            .await
            .unwrap();

        assert_eq!(report.drift.len(), 1);
        assert_eq!(report.drift[0].classification, DriftClass::Unchanged);
        assert_eq!(report.secrets.len(), 2);
        assert!(report.secrets[0].ok);
        assert!(!report.secrets[1].ok);
        // One bad secret reference means the review is not clean.
        assert!(!report.clean());
    }

    #[tokio::test]
    async fn clean_review_has_no_findings() {
        let dir = TempDir::new().unwrap();
        let store = BaselineStore::new(dir.path());
        store.accept("~/f", H0).unwrap();

        let exec = ScriptedExecutor::new();
        exec.on_ok("systemctl --user is-active", "active\n");
        exec.on_ok("sha256sum", &format!("{H0}  f\n"));
        exec.on_ok("df --output=pcent", "Use%\n 20%\n");
        exec.on_ok("vcgencmd measure_temp", "temp=45.0'C\n");
        exec.on_ok("free -b", "x\nMem: 4 1 1 0 2 99\n");
        exec.on_exit("pgrep -af", 1, "");

        let mut config = config::template();
        config.tracked_files = vec!["~/f".to_string()];

        let manifest = Manifest::parse("GOOD: op://agent/present/f\n").unwrap();
        let report = review(&exec, &config, &store, &OneVaultStore, &manifest)
            .await
            .unwrap();
        assert!(report.clean());

        // The resolved value never reaches the serialized review.
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("value-1"));
    }
}
