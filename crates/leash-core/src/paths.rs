use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const LEASH_DIR: &str = ".leash";
pub const CONFIG_FILE: &str = ".leash/config.yaml";
pub const MANIFEST_FILE: &str = ".leash/secrets.yaml";
pub const BASELINES_FILE: &str = ".leash/baselines.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn leash_dir(root: &Path) -> PathBuf {
    root.join(LEASH_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

pub fn baselines_path(root: &Path) -> PathBuf {
    root.join(BASELINES_FILE)
}
