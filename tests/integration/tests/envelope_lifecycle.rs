//! Sealing on one host and opening on the same or another host.

use envseal_integration_tests::{sample_bundle, seal_into};
use envseal_secrets::{artifacts, Materializer, SecretError, StaticIdentity};
use tempfile::TempDir;

#[tokio::test]
async fn test_same_host_opens_its_envelope() {
    let dir = TempDir::new().unwrap();
    let paths = seal_into(dir.path(), "host-42", "deadbeef", &sample_bundle());

    let materializer = Materializer::new(paths)
        .with_required_keys(vec!["DB_PASSWORD".into(), "API_KEY".into()]);
    let materialized = materializer
        .materialize(&StaticIdentity::new("host-42"))
        .await
        .unwrap();

    assert_eq!(materialized.bundle, sample_bundle());
    assert_eq!(
        materialized.bundle.get("DB_PASSWORD").unwrap().expose_secret(),
        "abc123"
    );
}

#[tokio::test]
async fn test_other_host_cannot_open() {
    let dir = TempDir::new().unwrap();
    let paths = seal_into(dir.path(), "host-42", "deadbeef", &sample_bundle());

    let result = Materializer::new(paths)
        .materialize(&StaticIdentity::new("host-43"))
        .await;
    assert!(matches!(result, Err(SecretError::DecryptionFailed(_))));
}

#[tokio::test]
async fn test_resealing_changes_ciphertext_not_contents() {
    let dir = TempDir::new().unwrap();
    let paths = seal_into(dir.path(), "host-42", "deadbeef", &sample_bundle());
    let first = std::fs::read_to_string(&paths.envelope).unwrap();
    seal_into(dir.path(), "host-42", "deadbeef", &sample_bundle());
    let second = std::fs::read_to_string(&paths.envelope).unwrap();
    assert_ne!(first, second);

    let bundle = Materializer::new(paths)
        .materialize(&StaticIdentity::new("host-42"))
        .await
        .unwrap()
        .bundle;
    assert_eq!(bundle, sample_bundle());
}

#[tokio::test]
async fn test_missing_required_key_blocks_startup() {
    let dir = TempDir::new().unwrap();
    let paths = seal_into(dir.path(), "host-42", "deadbeef", &sample_bundle());

    let result = Materializer::new(paths)
        .with_required_keys(vec!["DB_PASSWORD".into(), "REDIS_URL".into()])
        .materialize(&StaticIdentity::new("host-42"))
        .await;
    match result {
        Err(SecretError::MissingSecret(missing)) => assert_eq!(missing, vec!["REDIS_URL"]),
        other => panic!("expected MissingSecret, got {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn test_artifacts_are_private() {
    let dir = TempDir::new().unwrap();
    let paths = seal_into(dir.path(), "host-42", "deadbeef", &sample_bundle());
    assert_eq!(artifacts::loose_permissions(&paths.envelope).unwrap(), None);
    assert_eq!(artifacts::loose_permissions(&paths.salt).unwrap(), None);
}
