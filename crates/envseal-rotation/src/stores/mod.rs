//! Store clients.
//!
//! The identity provider is the authoritative store; repository secrets and
//! the cloud secret manager are secondaries that mirror its value.

mod gcp;
mod github;
mod keycloak;

pub use gcp::{GcpStore, GcpToken};
pub use github::GitHubStore;
pub use keycloak::{KeycloakAuth, KeycloakStore};

use async_trait::async_trait;
use envseal_core::config::EnvironmentConfig;
use envseal_core::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::credential::StoreKind;
use crate::error::{Result, RotationError};

/// The system whose value is the source of truth.
#[async_trait]
pub trait AuthoritativeStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Issue a new secret for `client_id` and return it.
    async fn regenerate(&self, client_id: &str) -> Result<SecretString>;

    /// Current secret for `client_id`.
    async fn read(&self, client_id: &str) -> Result<SecretString>;
}

/// A store mirroring the authoritative value.
#[async_trait]
pub trait SecondaryStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Create or overwrite `secret_name`, returning once the store confirms.
    async fn push(&self, secret_name: &str, value: &SecretString) -> Result<()>;
}

/// Credentials envseal itself needs to talk to the stores.
///
/// Resolved by the caller (environment variables, prompts) and passed in
/// explicitly; store clients never read process state.
#[derive(Debug, Default, Clone)]
pub struct StoreSecrets {
    pub keycloak: Option<KeycloakAuth>,
    pub github_token: Option<SecretString>,
    pub gcp_token: Option<SecretString>,
}

impl StoreSecrets {
    /// Resolve from the variable names in `config` using `lookup`.
    pub fn resolve(config: &EnvironmentConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let keycloak = match &config.keycloak.client_secret_env {
            Some(var) => lookup(var).map(|secret| KeycloakAuth::ClientCredentials {
                client_secret: SecretString::new(secret),
            }),
            None => lookup(&config.keycloak.admin_password_env).map(|password| {
                KeycloakAuth::Password {
                    username: config.keycloak.admin_user.clone(),
                    password: SecretString::new(password),
                }
            }),
        };
        let github_token = config
            .github
            .as_ref()
            .and_then(|gh| lookup(&gh.token_env))
            .map(SecretString::new);
        let gcp_token = config
            .gcp
            .as_ref()
            .and_then(|gcp| lookup(&gcp.token_env))
            .map(SecretString::new);

        Self {
            keycloak,
            github_token,
            gcp_token,
        }
    }
}

/// Store clients for one environment.
pub struct StoreSet {
    pub authoritative: Arc<dyn AuthoritativeStore>,
    pub secondaries: Vec<Arc<dyn SecondaryStore>>,
}

/// Build the clients an environment's config describes.
pub fn build(config: &EnvironmentConfig, secrets: StoreSecrets, timeout: Duration) -> Result<StoreSet> {
    let auth = secrets.keycloak.ok_or_else(|| {
        RotationError::config(format!(
            "no Keycloak admin credentials (set {})",
            config
                .keycloak
                .client_secret_env
                .as_deref()
                .unwrap_or(&config.keycloak.admin_password_env)
        ))
    })?;
    let authoritative: Arc<dyn AuthoritativeStore> =
        Arc::new(KeycloakStore::new(&config.keycloak, auth, timeout)?);

    let mut secondaries: Vec<Arc<dyn SecondaryStore>> = Vec::new();
    if let Some(github) = &config.github {
        let token = secrets.github_token.ok_or_else(|| {
            RotationError::config(format!("no GitHub token (set {})", github.token_env))
        })?;
        secondaries.push(Arc::new(GitHubStore::new(github, token, timeout)?));
    }
    if let Some(gcp) = &config.gcp {
        let token = match secrets.gcp_token {
            Some(token) => GcpToken::Static(token),
            None => GcpToken::Metadata {
                url: gcp.metadata_token_url.clone(),
            },
        };
        secondaries.push(Arc::new(GcpStore::new(gcp, token, timeout)?));
    }

    Ok(StoreSet {
        authoritative,
        secondaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_config() -> EnvironmentConfig {
        serde_json::from_value(serde_json::json!({
            "keycloak": { "url": "https://sso.example.com", "realm": "corp" },
            "github": { "repo": "acme/platform" }
        }))
        .unwrap()
    }

    #[test]
    fn test_resolve_password_grant() {
        let vars = HashMap::from([
            ("KEYCLOAK_ADMIN_PASSWORD", "pw"),
            ("GITHUB_TOKEN", "ghp_x"),
        ]);
        let secrets = StoreSecrets::resolve(&env_config(), |k| vars.get(k).map(|v| v.to_string()));

        match secrets.keycloak {
            Some(KeycloakAuth::Password { username, password }) => {
                assert_eq!(username, "admin");
                assert_eq!(password.expose_secret(), "pw");
            }
            other => panic!("unexpected auth: {other:?}"),
        }
        assert_eq!(secrets.github_token.unwrap().expose_secret(), "ghp_x");
        assert!(secrets.gcp_token.is_none());
    }

    #[test]
    fn test_build_requires_credentials() {
        let config = env_config();
        let err = build(&config, StoreSecrets::default(), Duration::from_secs(5)).err();
        assert!(matches!(err, Some(RotationError::Config(_))));

        let secrets = StoreSecrets {
            keycloak: Some(KeycloakAuth::Password {
                username: "admin".into(),
                password: SecretString::new("pw"),
            }),
            ..Default::default()
        };
        assert!(matches!(
            build(&config, secrets, Duration::from_secs(5)).err(),
            Some(RotationError::Config(_))
        ));
    }

    #[test]
    fn test_build_store_set() {
        let secrets = StoreSecrets {
            keycloak: Some(KeycloakAuth::ClientCredentials {
                client_secret: SecretString::new("s"),
            }),
            github_token: Some(SecretString::new("t")),
            gcp_token: None,
        };
        let set = build(&env_config(), secrets, Duration::from_secs(5)).unwrap();
        assert_eq!(set.authoritative.kind(), StoreKind::Keycloak);
        let kinds: Vec<_> = set.secondaries.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec![StoreKind::GitHub]);
    }
}
