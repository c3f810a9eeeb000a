//! Logical credentials and the stores that hold them.

use envseal_core::config::{CredentialConfig, Invalidation};
use serde::Serialize;
use std::fmt;

/// A system of record holding some representation of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Identity provider; authoritative.
    Keycloak,
    /// Repository Actions secrets; write-only.
    GitHub,
    /// Cloud secret manager; readable.
    Gcp,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keycloak => write!(f, "keycloak"),
            Self::GitHub => write!(f, "github"),
            Self::Gcp => write!(f, "gcp"),
        }
    }
}

/// A named credential with an authoritative value and optional mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalCredential {
    pub name: String,

    /// Client whose secret is regenerated at the identity provider.
    pub client_id: String,

    /// Repository secret mirroring the value.
    pub github_secret: Option<String>,

    /// Secret Manager secret id mirroring the value.
    pub gcp_secret: Option<String>,

    /// When the previous value stops working.
    pub invalidation: Invalidation,
}

impl LogicalCredential {
    pub fn new(name: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            github_secret: None,
            gcp_secret: None,
            invalidation: Invalidation::default(),
        }
    }

    pub fn with_github_secret(mut self, name: impl Into<String>) -> Self {
        self.github_secret = Some(name.into());
        self
    }

    pub fn with_gcp_secret(mut self, id: impl Into<String>) -> Self {
        self.gcp_secret = Some(id.into());
        self
    }

    /// Secondary store names for this credential, in store order.
    pub fn mirrors(&self) -> Vec<(StoreKind, &str)> {
        let mut mirrors = Vec::new();
        if let Some(name) = &self.github_secret {
            mirrors.push((StoreKind::GitHub, name.as_str()));
        }
        if let Some(id) = &self.gcp_secret {
            mirrors.push((StoreKind::Gcp, id.as_str()));
        }
        mirrors
    }
}

impl From<&CredentialConfig> for LogicalCredential {
    fn from(config: &CredentialConfig) -> Self {
        Self {
            name: config.name.clone(),
            client_id: config.client_id.clone(),
            github_secret: config.github_secret.clone(),
            gcp_secret: config.gcp_secret.clone(),
            invalidation: config.invalidation,
        }
    }
}
