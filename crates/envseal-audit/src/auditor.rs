//! Audit entry point combining the filesystem scan and container checks.

use envseal_core::config::{ArtifactsConfig, AuditConfig};
use std::path::PathBuf;
use tracing::info;

use crate::containers::{check_containers, ContainerInspector};
use crate::error::Result;
use crate::patterns::PatternSet;
use crate::report::AuditReport;
use crate::scanner::Scanner;

pub struct Auditor {
    scanner: Scanner,
    containers: Vec<String>,
    expected_container_vars: Vec<String>,
}

impl Auditor {
    pub fn new(scanner: Scanner) -> Self {
        Self {
            scanner,
            containers: Vec::new(),
            expected_container_vars: Vec::new(),
        }
    }

    /// Build from config. The envelope and salt are excluded from the scan.
    pub fn from_config(audit: &AuditConfig, artifacts: &ArtifactsConfig) -> Result<Self> {
        let patterns = PatternSet::new(&audit.extra_filename_patterns, &audit.extra_secret_names)?;
        let scanner = Scanner::new(patterns)
            .with_exclude_dirs(audit.exclude_dirs.iter().cloned())
            .with_excluded_file(&artifacts.envelope_path())
            .with_excluded_file(&artifacts.salt_path())
            .with_max_file_bytes(audit.max_file_bytes);

        Ok(Self::new(scanner)
            .with_containers(audit.containers.clone())
            .with_expected_container_vars(audit.expected_container_vars.clone()))
    }

    /// Containers to inspect; empty means every running one.
    pub fn with_containers(mut self, containers: Vec<String>) -> Self {
        self.containers = containers;
        self
    }

    pub fn with_expected_container_vars(mut self, names: Vec<String>) -> Self {
        self.expected_container_vars = names;
        self
    }

    /// Run the audit. Containers are only inspected when an inspector is
    /// given and expected names are configured.
    pub async fn audit(
        &self,
        roots: &[PathBuf],
        inspector: Option<&dyn ContainerInspector>,
    ) -> Result<AuditReport> {
        let mut report = self.scanner.scan(roots)?;

        if let Some(inspector) = inspector {
            let (violations, checked) =
                check_containers(inspector, &self.containers, &self.expected_container_vars)
                    .await?;
            report.violations.extend(violations);
            report.containers_checked = checked;
            report.normalize();
        }

        info!(
            files = report.files_scanned,
            containers = report.containers_checked,
            violations = report.violations.len(),
            "audit complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::tests::FakeInspector;
    use crate::report::Violation;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_audit_from_config_excludes_artifacts() {
        let dir = TempDir::new().unwrap();
        let artifacts = ArtifactsConfig {
            root: dir.path().to_path_buf(),
            envelope_file: "secrets.env".into(),
            ..ArtifactsConfig::default()
        };
        fs::write(artifacts.envelope_path(), "0011:AAAA\n").unwrap();
        fs::write(artifacts.salt_path(), "deadbeef\n").unwrap();

        let auditor = Auditor::from_config(&AuditConfig::default(), &artifacts).unwrap();
        let report = auditor.audit(&[dir.path().to_path_buf()], None).await.unwrap();
        assert!(report.is_clean(), "{:?}", report.violations);
    }

    #[tokio::test]
    async fn test_audit_combines_files_and_containers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "DB_PASSWORD=abc123\n").unwrap();

        let auditor = Auditor::from_config(&AuditConfig::default(), &ArtifactsConfig::default())
            .unwrap()
            .with_expected_container_vars(vec!["DB_PASSWORD".into()]);
        let inspector = FakeInspector(BTreeMap::from([("api".to_string(), vec!["PATH"])]));

        let report = auditor
            .audit(&[dir.path().to_path_buf()], Some(&inspector))
            .await
            .unwrap();
        assert_eq!(report.containers_checked, 1);
        assert_eq!(report.violations.len(), 3);
        assert!(matches!(
            report.violations.last(),
            Some(Violation::MissingContainerVar { container, .. }) if container == "api"
        ));
    }
}
