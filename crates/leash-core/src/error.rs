use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeashError {
    #[error("not initialized: run 'leash init'")]
    NotInitialized,

    #[error("target unreachable: {0}")]
    Connection(String),

    #[error("command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("secret-store credential invalid: {0}")]
    CredentialInvalid(String),

    #[error("secret unavailable: {reference}: {reason}")]
    SecretUnavailable { reference: String, reason: String },

    #[error("escalation to {0} requires operator confirmation (pass --yes)")]
    EscalationBlocked(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid secret reference '{0}': expected op://vault/item/field")]
    InvalidSecretRef(String),

    #[error("remote command failed (exit {code}): {stderr}")]
    RemoteCommand { code: i32, stderr: String },

    #[error("ssh binary not found: install an OpenSSH client")]
    SshNotInstalled,

    #[error("op binary not found: install the 1Password CLI")]
    OpNotInstalled,

    #[error("no baseline for '{0}': run 'leash audit accept' first")]
    BaselineNotFound(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LeashError>;
