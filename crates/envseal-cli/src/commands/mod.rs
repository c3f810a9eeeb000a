//! CLI command implementations.

pub mod audit;
pub mod config;
pub mod decrypt;
pub mod doctor;
pub mod encrypt;
pub mod rotate;
pub mod run;

use envseal_core::Config;
use envseal_secrets::ArtifactPaths;
use std::path::PathBuf;

/// Artifact locations from config, with command-line overrides.
///
/// An overridden envelope keeps its salt beside it unless the salt is
/// overridden too.
pub(crate) fn artifact_paths(
    config: &Config,
    envelope: Option<PathBuf>,
    salt: Option<PathBuf>,
) -> ArtifactPaths {
    let mut paths = ArtifactPaths::from(&config.artifacts);
    if let Some(envelope) = envelope {
        let salt_name = config
            .artifacts
            .salt_file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(envseal_core::paths::SALT_FILE));
        paths.salt = match envelope.parent() {
            Some(dir) => dir.join(salt_name),
            None => salt_name,
        };
        paths = paths.with_envelope(envelope);
    }
    if let Some(salt) = salt {
        paths = paths.with_salt(salt);
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_defaults_from_config() {
        let config = Config::default();
        let paths = artifact_paths(&config, None, None);
        assert_eq!(paths.envelope, Path::new(".").join(".env.enc"));
        assert_eq!(paths.salt, Path::new(".").join(".encryption-salt"));
    }

    #[test]
    fn test_envelope_override_moves_salt() {
        let config = Config::default();
        let paths = artifact_paths(&config, Some(PathBuf::from("/srv/app/.env.enc")), None);
        assert_eq!(paths.envelope, PathBuf::from("/srv/app/.env.enc"));
        assert_eq!(paths.salt, PathBuf::from("/srv/app/.encryption-salt"));

        let paths = artifact_paths(
            &config,
            Some(PathBuf::from("/srv/app/.env.enc")),
            Some(PathBuf::from("/etc/envseal/salt")),
        );
        assert_eq!(paths.salt, PathBuf::from("/etc/envseal/salt"));
    }
}
