use leash_core::{io, paths};
use std::path::Path;

const CONFIG_TEMPLATE: &str = "\
# leash control-plane configuration
target:
  host: agent-host.local
  user: agent
  port: 22
  connect_timeout_secs: 10
  command_timeout_secs: 30
service:
  unit: agent.service
  process_pattern: agent
  launch_command: agent run
tracked_files:
  - ~/.config/agent/agent.yaml
  - ~/.config/agent/SOUL.md
poll:
  attempts: 5
  interval_secs: 2
hard_kill:
  grace_secs: 5
";

const MANIFEST_TEMPLATE: &str = "\
# Symbolic secret references resolved at agent start. References only —
# values never land in this file or anywhere else on disk.
# Format: ENV_VAR: op://vault/item/field
ANTHROPIC_API_KEY: op://agent/anthropic/credential
";

pub fn run(root: &Path) -> anyhow::Result<()> {
    io::ensure_dir(&paths::leash_dir(root))?;

    report(
        paths::CONFIG_FILE,
        io::write_if_missing(&paths::config_path(root), CONFIG_TEMPLATE.as_bytes())?,
    );
    report(
        paths::MANIFEST_FILE,
        io::write_if_missing(&paths::manifest_path(root), MANIFEST_TEMPLATE.as_bytes())?,
    );

    println!("leash initialized — edit {} to point at your target", paths::CONFIG_FILE);
    Ok(())
}

fn report(path: &str, written: bool) {
    if written {
        println!("  created {path}");
    } else {
        println!("  exists  {path}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leash_core::config::Config;
    use leash_core::secrets::Manifest;

    #[test]
    fn config_template_parses() {
        let config: Config = serde_yaml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.service.unit, "agent.service");
        assert_eq!(config.tracked_files.len(), 2);
    }

    #[test]
    fn manifest_template_parses() {
        let manifest = Manifest::parse(MANIFEST_TEMPLATE).unwrap();
        assert_eq!(manifest.refs().len(), 1);
        assert_eq!(manifest.refs()[0].var, "ANTHROPIC_API_KEY");
    }
}
