//! Error types for envelope and materialization operations.

use envseal_core::{Classify, ExitStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while deriving keys, sealing, opening or
/// materializing a secrets bundle.
///
/// Messages never contain secret values.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Environment identity unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Missing required secret(s): {}", .0.join(", "))]
    MissingSecret(Vec<String>),

    #[error("Envelope not found: {0}")]
    EnvelopeMissing(PathBuf),

    #[error("Salt file not found: {0}")]
    SaltMissing(PathBuf),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Invalid bundle at line {line}: {reason}")]
    InvalidBundle { line: usize, reason: String },

    #[error("Refusing to replace the salt: {0} was encrypted with the existing one")]
    SaltInUse(PathBuf),

    #[error("Variable name not allowed in a bundle: {0}")]
    BlockedName(String),

    #[error("Insecure location: {0}")]
    InsecureLocation(String),

    #[error("Failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecretError {
    pub(crate) fn invalid_bundle(line: usize, reason: impl Into<String>) -> Self {
        Self::InvalidBundle {
            line,
            reason: reason.into(),
        }
    }
}

impl Classify for SecretError {
    fn exit_status(&self) -> ExitStatus {
        match self {
            Self::InvalidBundle { .. } | Self::SaltInUse(_) => ExitStatus::Usage,
            _ => ExitStatus::Failure,
        }
    }
}

/// Convenience result alias for secret operations.
pub type Result<T> = std::result::Result<T, SecretError>;
