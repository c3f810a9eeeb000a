//! Rotation plans.
//!
//! A plan is computed from configuration alone, so a dry run needs no store
//! credentials and makes no network calls.

use envseal_core::config::{Environment, EnvironmentConfig};
use envseal_core::Config;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::credential::{LogicalCredential, StoreKind};
use crate::error::{Result, RotationError};

/// Which credentials to rotate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Named(Vec<String>),
}

/// A push to one secondary store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPush {
    pub store: StoreKind,
    pub secret_name: String,
}

/// Everything that would change for one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRotation {
    pub credential: LogicalCredential,
    pub authoritative: StoreKind,
    pub pushes: Vec<PlannedPush>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationPlan {
    pub environment: Environment,
    pub rotations: Vec<PlannedRotation>,
}

impl RotationPlan {
    /// Plan the rotation of `selection` in `environment`.
    pub fn build(config: &Config, environment: Environment, selection: &Selection) -> Result<Self> {
        let env_config = config
            .environment(environment)
            .map_err(|e| RotationError::config(e.to_string()))?;

        let configured: Vec<LogicalCredential> = config
            .rotation
            .credentials
            .iter()
            .map(LogicalCredential::from)
            .collect();

        let selected: Vec<LogicalCredential> = match selection {
            Selection::All => configured,
            Selection::Named(names) => {
                let known: BTreeSet<&str> = configured.iter().map(|c| c.name.as_str()).collect();
                let unknown: Vec<String> = names
                    .iter()
                    .filter(|n| !known.contains(n.as_str()))
                    .cloned()
                    .collect();
                if !unknown.is_empty() {
                    return Err(RotationError::UnknownCredential(unknown));
                }
                let wanted: BTreeSet<&str> = names.iter().map(String::as_str).collect();
                configured
                    .into_iter()
                    .filter(|c| wanted.contains(c.name.as_str()))
                    .collect()
            }
        };

        if selected.is_empty() {
            return Err(RotationError::config(format!(
                "no credentials configured for rotation in {environment}"
            )));
        }

        let rotations = selected
            .into_iter()
            .map(|credential| plan_one(environment, env_config, credential))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            environment,
            rotations,
        })
    }

    pub fn credential_names(&self) -> Vec<&str> {
        self.rotations
            .iter()
            .map(|r| r.credential.name.as_str())
            .collect()
    }
}

fn plan_one(
    environment: Environment,
    env_config: &EnvironmentConfig,
    credential: LogicalCredential,
) -> Result<PlannedRotation> {
    let mut pushes = Vec::new();
    for (store, secret_name) in credential.mirrors() {
        let configured = match store {
            StoreKind::GitHub => env_config.github.is_some(),
            StoreKind::Gcp => env_config.gcp.is_some(),
            StoreKind::Keycloak => true,
        };
        if !configured {
            return Err(RotationError::config(format!(
                "credential '{}' mirrors to {store}, but {environment} has no {store} store",
                credential.name
            )));
        }
        pushes.push(PlannedPush {
            store,
            secret_name: secret_name.to_string(),
        });
    }

    Ok(PlannedRotation {
        credential,
        authoritative: StoreKind::Keycloak,
        pushes,
    })
}

impl fmt::Display for RotationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rotation plan for {}:", self.environment)?;
        for rotation in &self.rotations {
            let c = &rotation.credential;
            writeln!(
                f,
                "  {}: regenerate {} client secret '{}' (old value invalid: {})",
                c.name, rotation.authoritative, c.client_id, c.invalidation
            )?;
            for push in &rotation.pushes {
                writeln!(f, "    -> update {} secret '{}'", push.store, push.secret_name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::parse(
            r#"{
                rotation: {
                    environments: {
                        dev: {
                            keycloak: { url: "https://sso.dev.example.com", realm: "corp" },
                            github: { repo: "acme/platform" },
                        },
                    },
                    credentials: [
                        { name: "gateway", client_id: "mcp-gateway", github_secret: "MCP_GATEWAY_CLIENT_SECRET" },
                        { name: "hr", client_id: "mcp-hr" },
                        { name: "finance", client_id: "mcp-finance", gcp_secret: "finance-secret" },
                    ],
                },
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_plan_named() {
        let plan = RotationPlan::build(
            &config(),
            Environment::Dev,
            &Selection::Named(vec!["gateway".into()]),
        )
        .unwrap();
        assert_eq!(plan.credential_names(), vec!["gateway"]);
        assert_eq!(
            plan.rotations[0].pushes,
            vec![PlannedPush {
                store: StoreKind::GitHub,
                secret_name: "MCP_GATEWAY_CLIENT_SECRET".into()
            }]
        );
        let text = plan.to_string();
        assert!(text.contains("regenerate keycloak client secret 'mcp-gateway'"));
        assert!(text.contains("update github secret 'MCP_GATEWAY_CLIENT_SECRET'"));
    }

    #[test]
    fn test_unknown_credential() {
        let err = RotationPlan::build(
            &config(),
            Environment::Dev,
            &Selection::Named(vec!["gateway".into(), "payroll".into()]),
        )
        .unwrap_err();
        assert!(matches!(err, RotationError::UnknownCredential(names) if names == vec!["payroll".to_string()]));
    }

    #[test]
    fn test_mirror_without_store_is_config_error() {
        let err = RotationPlan::build(&config(), Environment::Dev, &Selection::All).unwrap_err();
        assert!(matches!(err, RotationError::Config(msg) if msg.contains("finance")));
    }

    #[test]
    fn test_unconfigured_environment() {
        let err = RotationPlan::build(&config(), Environment::Prod, &Selection::All).unwrap_err();
        assert!(matches!(err, RotationError::Config(_)));
    }
}
