use crate::cmd::{self, TargetOverrides};
use crate::output::{print_json, print_table};
use anyhow::bail;
use clap::Subcommand;
use leash_core::baseline::BaselineStore;
use leash_core::drift::DriftAuditor;
use std::path::Path;

#[derive(Subcommand)]
pub enum AuditSubcommand {
    /// Record the current remote content hash as the accepted baseline
    Accept {
        /// Tracked file path (as listed in config tracked_files)
        path: String,
    },
}

pub fn run(
    root: &Path,
    overrides: &TargetOverrides,
    subcommand: Option<AuditSubcommand>,
    json: bool,
) -> anyhow::Result<()> {
    let config = cmd::load_config(root, overrides)?;
    let exec = cmd::executor(&config)?;
    let store = BaselineStore::new(root);
    let auditor = DriftAuditor::new(&exec, &config);

    match subcommand {
        Some(AuditSubcommand::Accept { path }) => {
            let current = cmd::block_on(auditor.current_hash(&path))??;
            let Some(hash) = current else {
                bail!("cannot accept '{path}': file does not exist on the target");
            };
            let baseline = store.accept(&path, &hash)?;
            if json {
                print_json(&serde_json::json!({ "path": path, "baseline": baseline }))?;
            } else {
                println!("accepted {path} @ {}", short_hash(&baseline.hash));
            }
            Ok(())
        }
        None => {
            let entries = cmd::block_on(auditor.audit(&store))??;
            if json {
                return print_json(&entries);
            }
            let rows = entries
                .iter()
                .map(|e| {
                    vec![
                        e.path.clone(),
                        e.classification.to_string(),
                        e.baseline_hash.as_deref().map(short_hash).unwrap_or_default(),
                        e.current_hash.as_deref().map(short_hash).unwrap_or_default(),
                    ]
                })
                .collect();
            print_table(&["path", "drift", "baseline", "current"], rows);
            Ok(())
        }
    }
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect()
}
