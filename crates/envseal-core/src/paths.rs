//! Path resolution utilities.

use crate::env::{self, vars};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Default name of the encrypted envelope artifact.
pub const ENVELOPE_FILE: &str = ".env.enc";

/// Default name of the per-environment salt file.
pub const SALT_FILE: &str = ".encryption-salt";

/// Default name of the plaintext bundle used only in degraded mode.
pub const PLAINTEXT_FILE: &str = ".env";

/// Get the envseal base directory (`$ENVSEAL_HOME` or `~/.envseal`).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = env::get_var(vars::ENVSEAL_HOME) {
        return Ok(expand_tilde(&home));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".envseal"))
}

/// Get the main config file path (`~/.envseal/envseal.json5`).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("envseal.json5"))
}

/// Preferred directory for volatile (RAM-backed) files.
///
/// `$XDG_RUNTIME_DIR` is a per-user tmpfs on systemd hosts; `/dev/shm` is the
/// fallback.
pub fn default_volatile_dir() -> PathBuf {
    env::get_var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/dev/shm"))
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Check whether two paths point at the same file, tolerating missing files.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
