//! Environment variable handling.

use once_cell::sync::Lazy;
use regex::Regex;
use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable as a boolean.
pub fn get_bool(name: &str) -> bool {
    get_var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

static ENV_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Check that `name` is usable as a process environment variable name.
pub fn is_valid_name(name: &str) -> bool {
    ENV_NAME.is_match(name)
}

/// Variables that must never be injected into a child process from a
/// decrypted bundle.
pub const BLOCKED_ENV_VARS: &[&str] = &[
    // Dynamic linker injection
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    // Runtime injection
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PYTHONHOME",
    "PERL5LIB",
    // Shell injection
    "BASH_ENV",
    "ENV",
    "IFS",
    // Process plumbing
    "PATH",
    "SSLKEYLOGFILE",
];

/// Blocked environment variable prefixes.
pub const BLOCKED_ENV_PREFIXES: &[&str] = &["DYLD_", "LD_"];

/// Check if an environment variable name is blocked.
pub fn is_env_var_blocked(name: &str) -> bool {
    if BLOCKED_ENV_VARS.contains(&name) {
        return true;
    }
    BLOCKED_ENV_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Environment variable names read by envseal itself.
pub mod vars {
    /// Config file override.
    pub const ENVSEAL_CONFIG: &str = "ENVSEAL_CONFIG";

    /// Base directory override.
    pub const ENVSEAL_HOME: &str = "ENVSEAL_HOME";

    /// Log filter.
    pub const ENVSEAL_LOG: &str = "ENVSEAL_LOG";

    /// Explicit environment identity for the `static` identity source.
    pub const ENVSEAL_IDENTITY: &str = "ENVSEAL_IDENTITY";

    /// Skip the interactive confirmation before rotating credentials.
    pub const ENVSEAL_AUTO_APPROVE: &str = "ENVSEAL_AUTO_APPROVE";

    /// Set in the child's environment when a volatile env file was written.
    pub const ENVSEAL_ENV_FILE: &str = "ENVSEAL_ENV_FILE";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bool() {
        env::set_var("ENVSEAL_TEST_BOOL_TRUE", "true");
        env::set_var("ENVSEAL_TEST_BOOL_1", "1");
        env::set_var("ENVSEAL_TEST_BOOL_FALSE", "false");

        assert!(get_bool("ENVSEAL_TEST_BOOL_TRUE"));
        assert!(get_bool("ENVSEAL_TEST_BOOL_1"));
        assert!(!get_bool("ENVSEAL_TEST_BOOL_FALSE"));
        assert!(!get_bool("ENVSEAL_TEST_BOOL_NONEXISTENT"));
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("DB_PASSWORD"));
        assert!(is_valid_name("_private"));
        assert!(!is_valid_name("1ABC"));
        assert!(!is_valid_name("HAS-DASH"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_blocked_exact_and_prefix() {
        assert!(is_env_var_blocked("LD_PRELOAD"));
        assert!(is_env_var_blocked("NODE_OPTIONS"));
        assert!(is_env_var_blocked("DYLD_FRAMEWORK_PATH"));
        assert!(is_env_var_blocked("PATH"));
        assert!(!is_env_var_blocked("DB_PASSWORD"));
        assert!(!is_env_var_blocked("API_KEY"));
    }
}
