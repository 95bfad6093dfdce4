//! Secret resolution against the 1Password CLI (`op`).
//!
//! Layout:
//!   .leash/secrets.yaml — ENV_VAR: op://vault/item/field  (references only,
//!                         never values — safe to commit)
//!
//! Resolution happens entirely at the control point and is all-or-nothing: a
//! partially populated environment for a process start is worse than a clean
//! failure. Resolved values live in zeroize-on-drop memory, redact their
//! Debug/Display output, and implement no serde traits, so they cannot reach
//! a report, log line, or baseline through the serialization layer. The only
//! thing ever written to the remote host is the launcher script, which
//! contains no secret material; values travel over the ssh channel's stdin
//! at start and exist on the target only in the agent's process environment.

use crate::config::Config;
use crate::error::{LeashError, Result};
use crate::exec::Executor;
use crate::paths;
use serde::Serialize;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

// ---------------------------------------------------------------------------
// References and values
// ---------------------------------------------------------------------------

/// A declarative store/item/field mapping for one environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub var: String,
    pub vault: String,
    pub item: String,
    pub field: String,
}

impl SecretRef {
    /// Parse a manifest entry: `VAR: op://vault/item/field`.
    pub fn parse(var: &str, reference: &str) -> Result<Self> {
        let rest = reference
            .strip_prefix("op://")
            .ok_or_else(|| LeashError::InvalidSecretRef(reference.to_string()))?;
        let mut parts = rest.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(vault), Some(item), Some(field))
                if !vault.is_empty() && !item.is_empty() && !field.is_empty() =>
            {
                Ok(Self {
                    var: var.to_string(),
                    vault: vault.to_string(),
                    item: item.to_string(),
                    field: field.to_string(),
                })
            }
            _ => Err(LeashError::InvalidSecretRef(reference.to_string())),
        }
    }

    pub fn uri(&self) -> String {
        format!("op://{}/{}/{}", self.vault, self.item, self.field)
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.var, self.uri())
    }
}

/// A resolved secret value. Held in zeroize-on-drop memory for the duration
/// of process startup only. Intentionally implements neither `Serialize` nor
/// `Deserialize`.
pub struct SecretValue(Zeroizing<String>);

impl SecretValue {
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue([redacted])")
    }
}

impl std::fmt::Display for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[redacted]")
    }
}

/// The environment map produced by a successful resolution. Passed straight
/// into the remote process start and dropped immediately after.
#[derive(Debug)]
pub struct ResolvedEnv {
    vars: Vec<(String, SecretValue)>,
}

impl ResolvedEnv {
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.vars.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// `KEY=VALUE` lines for the remote launcher's stdin. Zeroized on drop.
    pub fn stdin_payload(&self) -> Zeroizing<Vec<u8>> {
        let mut buf = Vec::new();
        for (name, value) in &self.vars {
            buf.extend_from_slice(name.as_bytes());
            buf.push(b'=');
            buf.extend_from_slice(value.expose().as_bytes());
            buf.push(b'\n');
        }
        Zeroizing::new(buf)
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// The ordered reference list loaded from `.leash/secrets.yaml`.
#[derive(Debug)]
pub struct Manifest {
    refs: Vec<SecretRef>,
}

impl Manifest {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::manifest_path(root);
        if !path.exists() {
            return Ok(Self { refs: Vec::new() });
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content)
    }

    /// Parse `VAR: op://vault/item/field` entries, preserving file order.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self { refs: Vec::new() });
        }
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(content)?;
        let mut refs = Vec::with_capacity(mapping.len());
        for (key, value) in &mapping {
            // A non-string or empty key would become a malformed env line.
            let var = key
                .as_str()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| LeashError::InvalidSecretRef(format!("{key:?}")))?;
            let reference = value
                .as_str()
                .ok_or_else(|| LeashError::InvalidSecretRef(format!("{var}: non-string value")))?;
            refs.push(SecretRef::parse(var, reference)?);
        }
        Ok(Self { refs })
    }

    pub fn refs(&self) -> &[SecretRef] {
        &self.refs
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SecretStore backends
// ---------------------------------------------------------------------------

/// Backend-independent seam over the secret store.
pub trait SecretStore {
    /// Vault names the scoped credential can access. A rejection here means
    /// the credential itself is invalid.
    fn list_vaults(&self) -> Result<Vec<String>>;

    /// Resolve one reference to its value.
    fn read(&self, reference: &SecretRef) -> Result<SecretValue>;
}

/// Production backend shelling out to the 1Password CLI.
pub struct OpCli {
    bin: PathBuf,
}

impl OpCli {
    pub fn new() -> Result<Self> {
        let bin = which::which("op").map_err(|_| LeashError::OpNotInstalled)?;
        Ok(Self { bin })
    }
}

impl SecretStore for OpCli {
    fn list_vaults(&self) -> Result<Vec<String>> {
        let output = std::process::Command::new(&self.bin)
            .args(["vault", "list", "--format=json"])
            .output()
            .map_err(|e| LeashError::CredentialInvalid(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LeashError::CredentialInvalid(stderr.trim().to_string()));
        }
        #[derive(serde::Deserialize)]
        struct Vault {
            name: String,
        }
        let vaults: Vec<Vault> = serde_json::from_slice(&output.stdout)
            .map_err(|e| LeashError::CredentialInvalid(format!("unparsable vault list: {e}")))?;
        Ok(vaults.into_iter().map(|v| v.name).collect())
    }

    fn read(&self, reference: &SecretRef) -> Result<SecretValue> {
        let output = std::process::Command::new(&self.bin)
            .args(["read", "--no-newline", &reference.uri()])
            .output()
            .map_err(|e| LeashError::SecretUnavailable {
                reference: reference.uri(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LeashError::SecretUnavailable {
                reference: reference.uri(),
                reason: stderr.trim().to_string(),
            });
        }
        let value = String::from_utf8(output.stdout).map_err(|_| LeashError::SecretUnavailable {
            reference: reference.uri(),
            reason: "value is not valid UTF-8".to_string(),
        })?;
        Ok(SecretValue::new(value))
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve the whole manifest or fail. The credential's accessible-vault set
/// is validated once up front; a reference naming an inaccessible vault or a
/// failed lookup fails the entire batch.
pub fn resolve(store: &dyn SecretStore, manifest: &Manifest) -> Result<ResolvedEnv> {
    let vaults = store.list_vaults()?;
    for reference in manifest.refs() {
        if !vaults.iter().any(|v| v == &reference.vault) {
            return Err(LeashError::SecretUnavailable {
                reference: reference.uri(),
                reason: format!("vault '{}' is not accessible to this credential", reference.vault),
            });
        }
    }
    let mut vars = Vec::with_capacity(manifest.refs().len());
    for reference in manifest.refs() {
        let value = store.read(reference)?;
        vars.push((reference.var.clone(), value));
    }
    tracing::info!(count = vars.len(), "resolved secret references");
    Ok(ResolvedEnv { vars })
}

/// Per-reference resolvability state for the review report. Values are
/// discarded the moment they are read; only names and ok/failed survive.
#[derive(Debug, Clone, Serialize)]
pub struct RefCheck {
    pub var: String,
    pub reference: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-only variant of [`resolve`] used by `review` and `secrets check`.
pub fn check(store: &dyn SecretStore, manifest: &Manifest) -> Result<Vec<RefCheck>> {
    let vaults = store.list_vaults()?;
    let mut checks = Vec::with_capacity(manifest.refs().len());
    for reference in manifest.refs() {
        let result = if !vaults.iter().any(|v| v == &reference.vault) {
            Err(format!(
                "vault '{}' is not accessible to this credential",
                reference.vault
            ))
        } else {
            store.read(reference).map(drop).map_err(|e| e.to_string())
        };
        checks.push(RefCheck {
            var: reference.var.clone(),
            reference: reference.uri(),
            ok: result.is_ok(),
            error: result.err(),
        });
    }
    Ok(checks)
}

// ---------------------------------------------------------------------------
// Remote launcher
// ---------------------------------------------------------------------------

pub const LAUNCHER_PATH: &str = "~/.local/bin/leash-launch";

/// The invocation wrapper installed on the target: reads `KEY=VALUE` lines
/// from stdin and starts the agent under a transient systemd user unit with
/// those variables set. Contains no secret material.
pub fn launcher_script(config: &Config) -> String {
    let unit = unit_base(&config.service.unit);
    let launch = &config.service.launch_command;
    format!(
        "#!/bin/sh\n\
         # leash launcher: env arrives on stdin, never on disk\n\
         set -eu\n\
         set --\n\
         while IFS= read -r line; do\n\
         \tcase \"$line\" in ''|'#'*) continue ;; esac\n\
         \tset -- \"$@\" \"--setenv=$line\"\n\
         done\n\
         exec systemd-run --user --collect --quiet --unit={unit} \"$@\" {launch}\n"
    )
}

/// Install (or refresh) the launcher on the target. This is the resolver's
/// only use of the remote executor.
pub async fn install_launcher(exec: &dyn Executor, config: &Config) -> Result<()> {
    let script = launcher_script(config);
    let command = "mkdir -p ~/.local/bin && cat > ~/.local/bin/leash-launch \
                   && chmod 755 ~/.local/bin/leash-launch";
    let out = exec
        .execute_with_input(command, script.as_bytes(), config.target.command_timeout())
        .await?;
    if !out.success() {
        return Err(LeashError::RemoteCommand {
            code: out.exit_code,
            stderr: out.stderr.trim().to_string(),
        });
    }
    tracing::info!(path = LAUNCHER_PATH, "installed remote launcher");
    Ok(())
}

/// Start the agent, feeding the resolved environment to the launcher's
/// stdin. The caller drops `env` immediately after this returns.
pub async fn start_agent(exec: &dyn Executor, config: &Config, env: &ResolvedEnv) -> Result<()> {
    let payload = env.stdin_payload();
    let out = exec
        .execute_with_input(LAUNCHER_PATH, payload.as_slice(), config.target.command_timeout())
        .await?;
    if !out.success() {
        return Err(LeashError::RemoteCommand {
            code: out.exit_code,
            stderr: out.stderr.trim().to_string(),
        });
    }
    tracing::info!(unit = %config.service.unit, vars = env.len(), "agent started");
    Ok(())
}

fn unit_base(unit: &str) -> &str {
    unit.strip_suffix(".service").unwrap_or(unit)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeStore {
        vaults: Vec<String>,
        values: HashMap<String, String>,
        credential_ok: bool,
        reads: RefCell<u32>,
    }

    impl FakeStore {
        fn new(vaults: &[&str]) -> Self {
            Self {
                vaults: vaults.iter().map(|s| s.to_string()).collect(),
                values: HashMap::new(),
                credential_ok: true,
                reads: RefCell::new(0),
            }
        }

        fn with_value(mut self, uri: &str, value: &str) -> Self {
            self.values.insert(uri.to_string(), value.to_string());
            self
        }
    }

    impl SecretStore for FakeStore {
        fn list_vaults(&self) -> Result<Vec<String>> {
            if !self.credential_ok {
                return Err(LeashError::CredentialInvalid("token rejected".into()));
            }
            Ok(self.vaults.clone())
        }

        fn read(&self, reference: &SecretRef) -> Result<SecretValue> {
            *self.reads.borrow_mut() += 1;
            self.values
                .get(&reference.uri())
                .map(|v| SecretValue::new(v.clone()))
                .ok_or_else(|| LeashError::SecretUnavailable {
                    reference: reference.uri(),
                    reason: "item not found".into(),
                })
        }
    }

    fn manifest(entries: &str) -> Manifest {
        Manifest::parse(entries).unwrap()
    }

    #[test]
    fn parses_valid_reference() {
        let r = SecretRef::parse("API_KEY", "op://agent/anthropic/credential").unwrap();
        assert_eq!(r.var, "API_KEY");
        assert_eq!(r.vault, "agent");
        assert_eq!(r.item, "anthropic");
        assert_eq!(r.field, "credential");
        assert_eq!(r.uri(), "op://agent/anthropic/credential");
    }

    #[test]
    fn rejects_malformed_references() {
        for bad in ["op://vault/item", "vault/item/field", "op:///item/field", "op://v/i/"] {
            let err = SecretRef::parse("X", bad).unwrap_err();
            assert!(matches!(err, LeashError::InvalidSecretRef(_)), "{bad}");
        }
    }

    #[test]
    fn manifest_rejects_non_string_and_empty_var_names() {
        for bad in ["3: op://v/i/f\n", "true: op://v/i/f\n", "'': op://v/i/f\n"] {
            let err = Manifest::parse(bad).unwrap_err();
            assert!(matches!(err, LeashError::InvalidSecretRef(_)), "{bad}");
        }
    }

    #[test]
    fn manifest_preserves_file_order() {
        let m = manifest("B_VAR: op://v/b/f\nA_VAR: op://v/a/f\n");
        let vars: Vec<&str> = m.refs().iter().map(|r| r.var.as_str()).collect();
        assert_eq!(vars, vec!["B_VAR", "A_VAR"]);
    }

    #[test]
    fn secret_value_redacts_debug_and_display() {
        let v = SecretValue::new("sk-live-abcdef".into());
        assert_eq!(format!("{v:?}"), "SecretValue([redacted])");
        assert_eq!(format!("{v}"), "[redacted]");
        assert_eq!(v.expose(), "sk-live-abcdef");
    }

    #[test]
    fn resolve_is_all_or_nothing() {
        let store = FakeStore::new(&["agent"]).with_value("op://agent/a/f", "v1");
        let m = manifest("A: op://agent/a/f\nB: op://agent/missing/f\n");

        let err = resolve(&store, &m).unwrap_err();
        assert!(matches!(err, LeashError::SecretUnavailable { .. }));
    }

    #[test]
    fn invalid_credential_fails_before_any_read() {
        let mut store = FakeStore::new(&["agent"]);
        store.credential_ok = false;
        let m = manifest("A: op://agent/a/f\n");

        let err = resolve(&store, &m).unwrap_err();
        assert!(matches!(err, LeashError::CredentialInvalid(_)));
        assert_eq!(*store.reads.borrow(), 0);
    }

    #[test]
    fn inaccessible_vault_fails_before_any_read() {
        let store = FakeStore::new(&["agent"]);
        let m = manifest("A: op://other-vault/a/f\n");

        let err = resolve(&store, &m).unwrap_err();
        assert!(matches!(err, LeashError::SecretUnavailable { .. }));
        assert_eq!(*store.reads.borrow(), 0);
    }

    #[test]
    fn resolve_produces_ordered_env() {
        let store = FakeStore::new(&["agent"])
            .with_value("op://agent/a/f", "v1")
            .with_value("op://agent/b/f", "v2");
        let m = manifest("FIRST: op://agent/a/f\nSECOND: op://agent/b/f\n");

        let env = resolve(&store, &m).unwrap();
        assert_eq!(env.names(), vec!["FIRST", "SECOND"]);
        assert_eq!(&*env.stdin_payload(), b"FIRST=v1\nSECOND=v2\n");
    }

    #[test]
    fn check_reports_per_reference_without_values() {
        let store = FakeStore::new(&["agent"]).with_value("op://agent/a/f", "super-secret");
        let m = manifest("GOOD: op://agent/a/f\nBAD: op://agent/missing/f\n");

        let checks = check(&store, &m).unwrap();
        assert_eq!(checks.len(), 2);
        assert!(checks[0].ok);
        assert!(!checks[1].ok);
        assert!(checks[1].error.is_some());

        // The resolved value never reaches the serialized report.
        let json = serde_json::to_string(&checks).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn launcher_script_contains_no_secret_material() {
        let config = config::template();
        let script = launcher_script(&config);
        assert!(script.contains("systemd-run --user"));
        assert!(script.contains("--unit=agent"));
        assert!(script.starts_with("#!/bin/sh"));
        // The script only ever references stdin, never values.
        assert!(!script.contains("op://"));
    }

    #[test]
    fn unit_base_strips_service_suffix() {
        assert_eq!(unit_base("agent.service"), "agent");
        assert_eq!(unit_base("agent"), "agent");
    }
}
