//! Environment identity sources.
//!
//! Every source must work without any stored secret: the identity is what
//! unlocks the secrets, so it cannot itself be one of them. There is no
//! fallback between sources; if the configured source cannot answer, key
//! derivation stops with [`SecretError::IdentityUnavailable`].

use async_trait::async_trait;
use envseal_core::config::{IdentityConfig, IdentitySourceKind};
use envseal_core::env::{self, vars};
use envseal_core::SecretString;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SecretError};
use crate::types::EnvironmentIdentity;

/// Something that can tell us which environment we are running in.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Fetch the identity. Must be stable across restarts of the same
    /// logical instance.
    async fn fetch(&self) -> Result<EnvironmentIdentity>;
}

/// Build the source selected in config.
pub fn from_config(config: &IdentityConfig) -> Result<Box<dyn IdentitySource>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    Ok(match config.source {
        IdentitySourceKind::Metadata => Box::new(MetadataIdentity::new(
            config.metadata_url.clone(),
            config.metadata_headers.clone(),
            timeout,
        )?),
        IdentitySourceKind::Tooling => {
            Box::new(ToolingIdentity::new(config.tooling_command.clone(), timeout))
        }
        IdentitySourceKind::Static => Box::new(StaticIdentity::from_config(config)),
    })
}

/// Cloud instance metadata endpoint.
///
/// Unauthenticated and link-local; the instance id changes when the instance
/// is recreated, which deliberately invalidates old envelopes.
pub struct MetadataIdentity {
    client: reqwest::Client,
    url: String,
    headers: BTreeMap<String, String>,
}

impl MetadataIdentity {
    pub fn new(
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SecretError::IdentityUnavailable(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            headers,
        })
    }
}

#[async_trait]
impl IdentitySource for MetadataIdentity {
    fn name(&self) -> &'static str {
        "metadata"
    }

    async fn fetch(&self) -> Result<EnvironmentIdentity> {
        let mut request = self.client.get(&self.url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "timed out".to_string()
            } else {
                e.to_string()
            };
            SecretError::IdentityUnavailable(format!("metadata endpoint {}: {reason}", self.url))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SecretError::IdentityUnavailable(format!(
                "metadata endpoint {} returned {status}",
                self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SecretError::IdentityUnavailable(format!("metadata body: {e}")))?;
        let value = body.trim();
        if value.is_empty() {
            return Err(SecretError::IdentityUnavailable(
                "metadata endpoint returned an empty identity".to_string(),
            ));
        }

        debug!(source = "metadata", "environment identity obtained");
        Ok(EnvironmentIdentity::new(value))
    }
}

/// Identity of the authenticated developer tooling session.
pub struct ToolingIdentity {
    command: Vec<String>,
    timeout: Duration,
}

impl ToolingIdentity {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl IdentitySource for ToolingIdentity {
    fn name(&self) -> &'static str {
        "tooling"
    }

    async fn fetch(&self) -> Result<EnvironmentIdentity> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| SecretError::IdentityUnavailable("tooling command is empty".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                SecretError::IdentityUnavailable(format!(
                    "{program} did not answer within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| SecretError::IdentityUnavailable(format!("{program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SecretError::IdentityUnavailable(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = SecretString::from_utf8(output.stdout).ok_or_else(|| {
            SecretError::IdentityUnavailable(format!("{program} printed a non-UTF-8 identity"))
        })?;
        let value = stdout.expose_secret().trim();
        if value.is_empty() || value == "(unset)" {
            return Err(SecretError::IdentityUnavailable(format!(
                "{program} reports no authenticated session"
            )));
        }

        debug!(source = "tooling", program = %program, "environment identity obtained");
        Ok(EnvironmentIdentity::new(value))
    }
}

/// Explicitly supplied identity (CI, tests).
pub struct StaticIdentity {
    value: Option<EnvironmentIdentity>,
}

impl StaticIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(EnvironmentIdentity::new(value)),
        }
    }

    /// `ENVSEAL_IDENTITY` wins over the config value.
    pub fn from_config(config: &IdentityConfig) -> Self {
        let value = env::get_var(vars::ENVSEAL_IDENTITY)
            .or_else(|| config.static_value.clone().filter(|v| !v.trim().is_empty()));
        Self {
            value: value.map(|v| EnvironmentIdentity::new(v.trim())),
        }
    }
}

#[async_trait]
impl IdentitySource for StaticIdentity {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self) -> Result<EnvironmentIdentity> {
        self.value.clone().ok_or_else(|| {
            SecretError::IdentityUnavailable(format!(
                "no static identity configured (set identity.static_value or {})",
                vars::ENVSEAL_IDENTITY
            ))
        })
    }
}
