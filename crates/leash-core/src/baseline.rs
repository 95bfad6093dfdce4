//! Control-point-side baseline store for tracked remote files.
//!
//! Layout:
//!   .leash/baselines.yaml — tracked path → { hash, accepted_at }
//!
//! Written only through the explicit [`BaselineStore::accept`] operation.
//! The drift auditor reads it and never writes — a drift check must never
//! implicitly legitimize a change.

use crate::error::Result;
use crate::io;
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The last operator-accepted content hash for one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub hash: String,
    pub accepted_at: DateTime<Utc>,
}

pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: paths::baselines_path(root),
        }
    }

    pub fn load(&self) -> Result<BTreeMap<String, Baseline>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn get(&self, tracked_path: &str) -> Result<Option<Baseline>> {
        Ok(self.load()?.remove(tracked_path))
    }

    /// Record `hash` as the accepted baseline for `tracked_path`.
    pub fn accept(&self, tracked_path: &str, hash: &str) -> Result<Baseline> {
        let baseline = Baseline {
            hash: hash.to_string(),
            accepted_at: Utc::now(),
        };
        let mut all = self.load()?;
        all.insert(tracked_path.to_string(), baseline.clone());
        let content = serde_yaml::to_string(&all)?;
        io::atomic_write(&self.path, content.as_bytes())?;
        Ok(baseline)
    }
}
