//! Launching a service leaves nothing for the auditor to find.

use envseal_audit::Auditor;
use envseal_core::config::{ArtifactsConfig, AuditConfig};
use envseal_integration_tests::{sample_bundle, seal_into};
use envseal_secrets::{Materializer, ScopedLaunch, StaticIdentity, VolatileEnvFile};
use std::path::PathBuf;
use tempfile::TempDir;

fn auditor(root: &std::path::Path) -> Auditor {
    let artifacts = ArtifactsConfig {
        root: root.to_path_buf(),
        ..ArtifactsConfig::default()
    };
    Auditor::from_config(&AuditConfig::default(), &artifacts).unwrap()
}

#[tokio::test]
async fn test_no_plaintext_after_run() {
    let dir = TempDir::new().unwrap();
    let paths = seal_into(dir.path(), "host-42", "deadbeef", &sample_bundle());
    let roots = vec![dir.path().to_path_buf()];

    let materialized = Materializer::new(paths)
        .with_required_keys(vec!["DB_PASSWORD".into()])
        .materialize(&StaticIdentity::new("host-42"))
        .await
        .unwrap();

    // The volatile file lives under the audited root while the child runs.
    let env_file = VolatileEnvFile::create(dir.path(), &materialized.bundle, false).unwrap();
    let env_file_path: PathBuf = env_file.path().to_path_buf();
    let outcome = ScopedLaunch::new(
        "sh",
        vec![
            "-c".into(),
            r#"test "$DB_PASSWORD" = abc123 && test -f "$ENVSEAL_ENV_FILE""#.into(),
        ],
    )
    .with_env_file(env_file)
    .run(&materialized.bundle)
    .await
    .unwrap();
    assert!(outcome.success());
    assert!(!env_file_path.exists());

    let report = auditor(dir.path()).audit(&roots, None).await.unwrap();
    assert!(report.is_clean(), "unexpected violations: {:?}", report.violations);
}

#[tokio::test]
async fn test_audit_is_idempotent() {
    let dir = TempDir::new().unwrap();
    seal_into(dir.path(), "host-42", "deadbeef", &sample_bundle());
    std::fs::write(dir.path().join(".env"), "DB_PASSWORD=abc123\n").unwrap();
    std::fs::create_dir(dir.path().join("deploy")).unwrap();
    std::fs::write(
        dir.path().join("deploy/compose.yml"),
        "services:\n  api:\n    environment:\n      API_KEY: xyz789\n      DB_PASSWORD: ${DB_PASSWORD}\n",
    )
    .unwrap();
    let roots = vec![dir.path().to_path_buf()];

    let auditor = auditor(dir.path());
    let first = auditor.audit(&roots, None).await.unwrap();
    let second = auditor.audit(&roots, None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.violations.len(), 3, "{:?}", first.violations);
    let json = first.to_json().unwrap();
    assert!(!json.contains("abc123"));
    assert!(!json.contains("xyz789"));
}
