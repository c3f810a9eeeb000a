//! Running-container environment inspection.
//!
//! This is a positive check: it confirms the materializer delivered the
//! expected variable names. Values are discarded as soon as the output is
//! parsed.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{AuditError, Result};
use crate::report::Violation;

/// Source of container names and their environment variable names.
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Names of running containers.
    async fn running(&self) -> Result<Vec<String>>;

    /// Environment variable names set in `container`.
    async fn env_names(&self, container: &str) -> Result<BTreeSet<String>>;
}

/// Inspector backed by a Docker-compatible CLI (`docker`, `podman`).
pub struct CliInspector {
    runtime: String,
    timeout: Duration,
}

impl CliInspector {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn capture(&self, args: &[&str]) -> Result<Zeroizing<Vec<u8>>> {
        let mut cmd = Command::new(&self.runtime);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                AuditError::Container(format!(
                    "{} {} timed out after {}s",
                    self.runtime,
                    args.first().unwrap_or(&""),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AuditError::Container(format!("{}: {e}", self.runtime)))?;

        let stdout = Zeroizing::new(output.stdout);
        if !output.status.success() {
            return Err(AuditError::Container(format!(
                "{} {} failed: {}",
                self.runtime,
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ContainerInspector for CliInspector {
    async fn running(&self) -> Result<Vec<String>> {
        let stdout = self.capture(&["ps", "--format", "{{.Names}}"]).await?;
        let mut names: Vec<String> = String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn env_names(&self, container: &str) -> Result<BTreeSet<String>> {
        let stdout = self
            .capture(&["inspect", "--format", "{{json .Config.Env}}", container])
            .await?;
        parse_env_names(&stdout)
    }
}

/// Names from a JSON array of `KEY=value` strings.
pub fn parse_env_names(json: &[u8]) -> Result<BTreeSet<String>> {
    let entries: Zeroizing<Vec<String>> = Zeroizing::new(
        serde_json::from_slice::<Option<Vec<String>>>(json)
            .map_err(|e| AuditError::Container(format!("unexpected inspect output: {e}")))?
            .unwrap_or_default(),
    );
    Ok(entries
        .iter()
        .filter_map(|entry| entry.split_once('=').map(|(name, _)| name.to_string()))
        .collect())
}

/// Check each container for the expected names.
///
/// Returns the violations and the number of containers checked. A container
/// that exits between listing and inspection is skipped; one named explicitly
/// that cannot be inspected is a violation.
pub async fn check_containers(
    inspector: &dyn ContainerInspector,
    containers: &[String],
    expected: &[String],
) -> Result<(Vec<Violation>, usize)> {
    if expected.is_empty() {
        return Ok((Vec::new(), 0));
    }

    let discovered = containers.is_empty();
    let targets = if discovered {
        inspector.running().await?
    } else {
        containers.to_vec()
    };

    let mut violations = Vec::new();
    let mut checked = 0;
    for container in &targets {
        let names = match inspector.env_names(container).await {
            Ok(names) => names,
            Err(AuditError::Container(reason)) if discovered => {
                warn!(container = %container, reason = %reason, "container vanished before inspection");
                continue;
            }
            Err(AuditError::Container(reason)) => {
                violations.push(Violation::ContainerUnavailable {
                    container: container.clone(),
                    reason,
                });
                continue;
            }
            Err(e) => return Err(e),
        };
        checked += 1;
        debug!(container = %container, vars = names.len(), "inspected container");
        for name in expected {
            if !names.contains(name) {
                violations.push(Violation::MissingContainerVar {
                    container: container.clone(),
                    name: name.clone(),
                });
            }
        }
    }
    Ok((violations, checked))
}
