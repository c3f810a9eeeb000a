//! On-disk artifacts: the envelope file and the salt file.
//!
//! Both are single-writer (the provisioning / `encrypt` step) and
//! multi-reader (every materialization). Writes go through a temp file and a
//! rename, and the files are created owner-read/write only.

use envseal_core::config::ArtifactsConfig;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::envelope::Envelope;
use crate::error::{Result, SecretError};
use crate::types::EncryptionSalt;

/// Permission bits for every artifact.
pub const PRIVATE_MODE: u32 = 0o600;

/// Resolved artifact locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub envelope: PathBuf,
    pub salt: PathBuf,
    pub plaintext: PathBuf,
}

impl ArtifactPaths {
    /// Standard layout under `root`.
    pub fn in_dir(root: &Path) -> Self {
        Self::from(&ArtifactsConfig {
            root: root.to_path_buf(),
            ..ArtifactsConfig::default()
        })
    }

    /// Replace the envelope path.
    pub fn with_envelope(mut self, envelope: PathBuf) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn with_salt(mut self, salt: PathBuf) -> Self {
        self.salt = salt;
        self
    }
}

impl From<&ArtifactsConfig> for ArtifactPaths {
    fn from(config: &ArtifactsConfig) -> Self {
        Self {
            envelope: config.envelope_path(),
            salt: config.salt_path(),
            plaintext: config.plaintext_path(),
        }
    }
}

/// Read the salt file.
pub fn read_salt(path: &Path) -> Result<EncryptionSalt> {
    if !path.exists() {
        return Err(SecretError::SaltMissing(path.to_path_buf()));
    }
    let salt = EncryptionSalt::from_file_contents(&fs::read(path)?);
    if salt.is_empty() {
        return Err(SecretError::InvalidEnvelope(format!(
            "salt file {} is empty",
            path.display()
        )));
    }
    Ok(salt)
}

/// Return the existing salt, or create one if this environment has none.
///
/// A salt is never rotated: replacing it would make the existing envelope
/// undecryptable. Returns `true` as the second element when the salt was
/// created by this call.
pub fn load_or_create_salt(salt_path: &Path, envelope_path: &Path) -> Result<(EncryptionSalt, bool)> {
    if salt_path.exists() {
        return Ok((read_salt(salt_path)?, false));
    }
    if envelope_path.exists() {
        return Err(SecretError::SaltMissing(salt_path.to_path_buf()));
    }
    let salt = EncryptionSalt::generate();
    let mut contents = salt.as_bytes().to_vec();
    contents.push(b'\n');
    write_private(salt_path, &contents)?;
    info!(path = %salt_path.display(), "created encryption salt");
    Ok((salt, true))
}

/// Create a fresh salt, refusing if an envelope already depends on the old one.
pub fn create_new_salt(salt_path: &Path, envelope_path: &Path) -> Result<EncryptionSalt> {
    if envelope_path.exists() && salt_path.exists() {
        return Err(SecretError::SaltInUse(envelope_path.to_path_buf()));
    }
    let salt = EncryptionSalt::generate();
    let mut contents = salt.as_bytes().to_vec();
    contents.push(b'\n');
    write_private(salt_path, &contents)?;
    info!(path = %salt_path.display(), "created encryption salt");
    Ok(salt)
}

/// Read and parse the envelope file.
pub fn read_envelope(path: &Path) -> Result<Envelope> {
    if !path.exists() {
        return Err(SecretError::EnvelopeMissing(path.to_path_buf()));
    }
    Envelope::parse(&fs::read_to_string(path)?)
}

/// Write the envelope file (mode 600).
pub fn write_envelope(path: &Path, envelope: &Envelope) -> Result<()> {
    let mut line = envelope.encode();
    line.push('\n');
    write_private(path, line.as_bytes())?;
    debug!(path = %path.display(), "wrote envelope");
    Ok(())
}

/// Write `data` to `path` atomically, with mode 0600 on Unix.
///
/// The temp file is created with restrictive permissions from the start, so
/// there is no window in which it is world-readable.
pub fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_MODE);
    }

    let result = (|| {
        let mut file = options.open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        set_private(&temp_path)?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result.map_err(SecretError::from)
}

/// Force mode 0600 on an existing file.
pub fn set_private(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(PRIVATE_MODE))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Permission bits of `path` when they are broader than 0600.
#[cfg(unix)]
pub fn loose_permissions(path: &Path) -> Result<Option<u32>> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path)?.permissions().mode() & 0o777;
    Ok((mode & !PRIVATE_MODE != 0).then_some(mode))
}

#[cfg(not(unix))]
pub fn loose_permissions(_path: &Path) -> Result<Option<u32>> {
    Ok(None)
}
