//! Shared fixtures for the cross-crate tests.

use envseal_secrets::artifacts::{self, write_private};
use envseal_secrets::{derive_key, ArtifactPaths, EncryptionSalt, EnvironmentIdentity, Envelope, SecretsBundle};
use std::path::Path;

/// The bundle used throughout: two secrets a service cannot start without.
pub fn sample_bundle() -> SecretsBundle {
    SecretsBundle::from_pairs([("DB_PASSWORD", "abc123"), ("API_KEY", "xyz789")])
        .expect("valid bundle")
}

/// Seal `bundle` under `identity` with the salt text `salt` into `root`,
/// using the standard file names.
pub fn seal_into(root: &Path, identity: &str, salt: &str, bundle: &SecretsBundle) -> ArtifactPaths {
    let paths = ArtifactPaths::in_dir(root);
    write_private(&paths.salt, format!("{salt}\n").as_bytes()).expect("write salt");

    let key = derive_key(
        &EnvironmentIdentity::new(identity),
        &EncryptionSalt::from_file_contents(salt.as_bytes()),
    );
    let envelope = Envelope::seal(bundle, &key).expect("seal");
    artifacts::write_envelope(&paths.envelope, &envelope).expect("write envelope");
    paths
}
