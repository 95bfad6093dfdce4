use crate::cmd::{self, TargetOverrides};
use crate::output::{print_json, print_table};
use clap::Subcommand;
use leash_core::secrets::{self, Manifest, OpCli};
use std::path::Path;

#[derive(Subcommand)]
pub enum SecretsSubcommand {
    /// Verify every manifest reference resolves; values are discarded
    Check,
    /// Install the stdin-fed launcher script on the target
    Install,
}

pub fn run(
    root: &Path,
    overrides: &TargetOverrides,
    subcommand: SecretsSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcommand {
        SecretsSubcommand::Check => check(root, json),
        SecretsSubcommand::Install => install(root, overrides),
    }
}

fn check(root: &Path, json: bool) -> anyhow::Result<()> {
    let manifest = Manifest::load(root)?;
    let store = OpCli::new()?;
    let checks = secrets::check(&store, &manifest)?;

    if json {
        return print_json(&checks);
    }
    let rows = checks
        .iter()
        .map(|c| {
            vec![
                c.var.clone(),
                c.reference.clone(),
                if c.ok { "ok".to_string() } else { "failed".to_string() },
                c.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["var", "reference", "state", "error"], rows);
    Ok(())
}

fn install(root: &Path, overrides: &TargetOverrides) -> anyhow::Result<()> {
    let config = cmd::load_config(root, overrides)?;
    let exec = cmd::executor(&config)?;
    cmd::block_on(secrets::install_launcher(&exec, &config))??;
    println!("launcher installed at {}", secrets::LAUNCHER_PATH);
    Ok(())
}
