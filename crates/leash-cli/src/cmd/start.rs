use crate::cmd::{self, TargetOverrides};
use crate::output::print_json;
use leash_core::secrets::{self, Manifest, OpCli};
use std::path::Path;

/// Resolve the full manifest, then launch the remote agent with the
/// resolved environment fed to the launcher over stdin. Resolution is
/// all-or-nothing and happens before anything touches the target; the
/// resolved map is dropped as soon as the start call returns.
pub fn run(root: &Path, overrides: &TargetOverrides, json: bool) -> anyhow::Result<()> {
    let config = cmd::load_config(root, overrides)?;
    let manifest = Manifest::load(root)?;

    let store = OpCli::new()?;
    let env = secrets::resolve(&store, &manifest)?;
    let injected = env.len();

    let exec = cmd::executor(&config)?;
    cmd::block_on(async {
        secrets::install_launcher(&exec, &config).await?;
        secrets::start_agent(&exec, &config, &env).await
    })??;
    drop(env);

    if json {
        print_json(&serde_json::json!({
            "unit": config.service.unit,
            "secrets_injected": injected,
        }))?;
    } else {
        println!(
            "started {} with {injected} secret(s) injected",
            config.service.unit
        );
    }
    Ok(())
}
