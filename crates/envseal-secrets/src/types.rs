//! Inputs to key derivation.

use envseal_core::SecretString;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroize;

/// Number of random bytes in a freshly generated salt.
pub const SALT_BYTES: usize = 32;

/// Opaque value identifying the runtime environment.
///
/// A cloud instance id on hosts, a developer account on workstations. It is
/// the secret half of the key material, so it is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvironmentIdentity(SecretString);

impl EnvironmentIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for EnvironmentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvironmentIdentity([REDACTED])")
    }
}

/// Per-environment salt, persisted next to the envelope.
///
/// The salt is the trimmed text of the salt file; new salts are 32 random
/// bytes written as lowercase hex.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionSalt(Vec<u8>);

impl EncryptionSalt {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse the contents of a salt file.
    pub fn from_file_contents(contents: &[u8]) -> Self {
        let start = contents
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(contents.len());
        let end = contents
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(start, |i| i + 1);
        Self(contents[start..end].to_vec())
    }

    /// Generate a new random salt.
    pub fn generate() -> Self {
        let mut raw = [0u8; SALT_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let salt = Self(hex::encode(raw).into_bytes());
        raw.zeroize();
        salt
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EncryptionSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionSalt({} bytes)", self.0.len())
    }
}
