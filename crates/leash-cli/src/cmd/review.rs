use crate::cmd::{self, TargetOverrides};
use crate::output::{print_json, print_table};
use leash_core::baseline::BaselineStore;
use leash_core::review;
use leash_core::secrets::{Manifest, OpCli};
use std::path::Path;

pub fn run(root: &Path, overrides: &TargetOverrides, json: bool) -> anyhow::Result<()> {
    let config = cmd::load_config(root, overrides)?;
    let exec = cmd::executor(&config)?;
    let store = BaselineStore::new(root);
    let manifest = Manifest::load(root)?;
    let secret_store = OpCli::new()?;

    let report = cmd::block_on(review::review(
        &exec,
        &config,
        &store,
        &secret_store,
        &manifest,
    ))??;

    if json {
        return print_json(&report);
    }

    println!("review @ {}", report.taken_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    println!("health: service {}", report.health.service);
    for failure in &report.health.errors {
        println!("  warning: {} check failed: {}", failure.check, failure.error);
    }
    println!();
    let drift_rows = report
        .drift
        .iter()
        .map(|e| vec![e.path.clone(), e.classification.to_string()])
        .collect();
    print_table(&["tracked file", "drift"], drift_rows);
    println!();
    let secret_rows = report
        .secrets
        .iter()
        .map(|c| {
            vec![
                c.var.clone(),
                if c.ok { "ok".to_string() } else { "failed".to_string() },
            ]
        })
        .collect();
    print_table(&["secret", "state"], secret_rows);
    println!();
    if report.clean() {
        println!("clean: no findings");
    } else {
        println!("findings present — inspect the sections above");
    }
    Ok(())
}
