//! Configuration loading and persistence.

use super::{
    Config, CredentialConfig, Environment, EnvironmentConfig, IdentitySourceKind,
    MAX_ENV_FILE_GRACE_SECS,
};
use crate::env::{self, vars};
use crate::error::ConfigError;
use crate::paths;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

impl Config {
    /// Resolve the config path from an explicit flag, `ENVSEAL_CONFIG`, or the default.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = env::get_var(vars::ENVSEAL_CONFIG) {
            return Ok(paths::expand_tilde(&path));
        }
        paths::config_file()
    }

    /// Load configuration, using built-in defaults when the file does not exist.
    ///
    /// An explicitly requested file that is missing is still an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::resolve_path(explicit)?;
        match Self::load(&path) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) if explicit.is_none() => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Look up a credential by name.
    pub fn credential(&self, name: &str) -> Option<&CredentialConfig> {
        self.rotation.credentials.iter().find(|c| c.name == name)
    }

    /// Look up the external systems for an environment.
    pub fn environment(&self, env: Environment) -> Result<&EnvironmentConfig, ConfigError> {
        self.rotation.environments.get(&env.to_string()).ok_or_else(|| {
            ConfigError::Validation(format!("environment '{env}' is not configured"))
        })
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Identity source must be usable
        match self.identity.source {
            IdentitySourceKind::Metadata => {
                if url::Url::parse(&self.identity.metadata_url).is_err() {
                    errors.push(format!(
                        "identity.metadata_url is not a valid URL: {}",
                        self.identity.metadata_url
                    ));
                }
            }
            IdentitySourceKind::Tooling => {
                if self.identity.tooling_command.is_empty() {
                    errors.push("identity.tooling_command must not be empty".to_string());
                }
            }
            IdentitySourceKind::Static => {}
        }
        if self.identity.timeout_secs == 0 {
            errors.push("identity.timeout_secs must be greater than 0".to_string());
        }

        // 2. Required keys must be valid variable names
        for key in &self.materialize.required_keys {
            if !env::is_valid_name(key) {
                errors.push(format!("materialize.required_keys: invalid name '{key}'"));
            }
        }
        if self.materialize.env_file_grace_secs > MAX_ENV_FILE_GRACE_SECS {
            errors.push(format!(
                "materialize.env_file_grace_secs must be at most {MAX_ENV_FILE_GRACE_SECS}"
            ));
        }

        // 3. Audit patterns must compile
        for pattern in &self.audit.extra_filename_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("audit.extra_filename_patterns: '{pattern}': {e}"));
            }
        }
        for name in self
            .audit
            .extra_secret_names
            .iter()
            .chain(&self.audit.expected_container_vars)
        {
            if !env::is_valid_name(name) {
                errors.push(format!("audit: invalid variable name '{name}'"));
            }
        }

        // 4. Rotation limits
        if self.rotation.concurrency == 0 {
            errors.push("rotation.concurrency must be greater than 0".to_string());
        }
        if self.rotation.timeout_secs == 0 {
            errors.push("rotation.timeout_secs must be greater than 0".to_string());
        }
        if self.rotation.retry.multiplier < 1.0 {
            errors.push(format!(
                "rotation.retry.multiplier must be >= 1.0, got {}",
                self.rotation.retry.multiplier
            ));
        }

        // 5. Environments
        for (env, cfg) in &self.rotation.environments {
            if let Err(e) = env.parse::<Environment>() {
                errors.push(format!("rotation.environments: {e}"));
            }
            if url::Url::parse(&cfg.keycloak.url).is_err() {
                errors.push(format!("{env}: keycloak.url is not a valid URL"));
            }
            if cfg.keycloak.realm.is_empty() {
                errors.push(format!("{env}: keycloak.realm must not be empty"));
            }
            if let Some(github) = &cfg.github {
                let parts: Vec<&str> = github.repo.split('/').collect();
                if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
                    errors.push(format!(
                        "{env}: github.repo must be 'owner/name', got '{}'",
                        github.repo
                    ));
                }
            }
            if let Some(gcp) = &cfg.gcp {
                if gcp.project.is_empty() {
                    errors.push(format!("{env}: gcp.project must not be empty"));
                }
            }
        }

        // 6. Credentials: unique names, a client id, and only stores that exist
        let mut seen = HashSet::new();
        for cred in &self.rotation.credentials {
            if !seen.insert(cred.name.as_str()) {
                errors.push(format!("duplicate credential name '{}'", cred.name));
            }
            if cred.client_id.is_empty() {
                errors.push(format!("credential '{}': client_id must not be empty", cred.name));
            }
            if let Some(secret) = &cred.github_secret {
                if !env::is_valid_name(secret) {
                    errors.push(format!(
                        "credential '{}': invalid github_secret name '{secret}'",
                        cred.name
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Invalidation;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        // comments are allowed
        materialize: { required_keys: ["DB_PASSWORD", "API_KEY"] },
        rotation: {
            concurrency: 2,
            environments: {
                dev: {
                    keycloak: { url: "https://sso.dev.local/auth", realm: "corp" },
                    github: { repo: "acme/platform" },
                },
            },
            credentials: [
                { name: "gateway", client_id: "mcp-gateway", github_secret: "MCP_GATEWAY_CLIENT_SECRET" },
                { name: "hr", client_id: "mcp-hr", gcp_secret: "mcp-hr-client-secret", invalidation: "eventual" },
            ],
        },
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.materialize.required_keys, vec!["DB_PASSWORD", "API_KEY"]);
        assert_eq!(config.rotation.concurrency, 2);
        assert_eq!(config.rotation.timeout_secs, 30);
        let dev = config.environment(Environment::Dev).unwrap();
        assert_eq!(dev.keycloak.admin_client_id, "admin-cli");
        assert_eq!(dev.github.as_ref().unwrap().api_url, "https://api.github.com");
        assert!(config.environment(Environment::Prod).is_err());
        assert_eq!(
            config.credential("hr").unwrap().invalidation,
            Invalidation::Eventual
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.artifacts.envelope_path(), PathBuf::from("./.env.enc"));
        assert_eq!(config.identity.source, IdentitySourceKind::Metadata);
        assert!(config.materialize.require_memory_backed);
        assert!(!config.materialize.allow_plaintext_fallback);
        assert_eq!(config.materialize.env_file_grace_secs, 5);
        assert!(!config.materialize.keep_env_file_until_exit);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.rotation.concurrency = 0;
        config.materialize.required_keys.push("bad-name".to_string());
        config.materialize.env_file_grace_secs = 3600;
        config.rotation.credentials.push(config.rotation.credentials[0].clone());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("concurrency"));
        assert!(err.contains("bad-name"));
        assert!(err.contains("env_file_grace_secs"));
        assert!(err.contains("duplicate credential"));
    }

    #[test]
    fn test_validate_github_repo() {
        let mut config = Config::parse(SAMPLE).unwrap();
        let dev = config.rotation.environments.get_mut("dev").unwrap();
        dev.github.as_mut().unwrap().repo = "no-slash".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("envseal.json5");

        let config = Config::parse(SAMPLE).unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.rotation.credentials.len(), 2);
        assert_eq!(loaded.materialize.required_keys, config.materialize.required_keys);
    }

    #[test]
    fn test_load_missing_explicit_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json5");
        assert!(matches!(
            Config::load_or_default(Some(&path)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(Config::parse("not valid"), Err(ConfigError::Json5(_))));
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("staging".parse::<Environment>().unwrap(), Environment::Stage);
        assert!("qa".parse::<Environment>().is_err());
    }
}
