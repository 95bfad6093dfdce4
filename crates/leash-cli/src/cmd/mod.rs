pub mod audit;
pub mod escalate;
pub mod init;
pub mod review;
pub mod secrets;
pub mod start;
pub mod status;

use anyhow::Context;
use leash_core::config::Config;
use leash_core::exec::SshExecutor;
use std::path::Path;

/// Flag/env target overrides collected by the top-level parser.
#[derive(Debug, Default, Clone)]
pub struct TargetOverrides {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

pub(crate) fn load_config(root: &Path, overrides: &TargetOverrides) -> anyhow::Result<Config> {
    let mut config = Config::load(root)?;
    config.apply_overrides(
        overrides.host.as_deref(),
        overrides.user.as_deref(),
        overrides.port,
    );
    Ok(config)
}

pub(crate) fn executor(config: &Config) -> anyhow::Result<SshExecutor> {
    Ok(SshExecutor::new(config.target.clone())?)
}

/// The CLI is a short-lived batch process: build a runtime per command and
/// block on it.
pub(crate) fn block_on<F: std::future::Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().context("failed to build tokio runtime")?;
    Ok(rt.block_on(fut))
}
