//! Environment-bound key derivation.
//!
//! `key = SHA-256(identity || salt)`. The derivation is pure, so any host
//! that can independently obtain the same identity and read the same salt
//! file derives the same key. There is no fallback key: a host that cannot
//! prove its identity cannot decrypt.

use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::{EncryptionSalt, EnvironmentIdentity};

/// Length of a derived key in bytes.
pub const KEY_SIZE: usize = 32;

/// A 256-bit symmetric key, zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short non-reversible tag for comparing keys across hosts in logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey(fp={})", self.fingerprint())
    }
}

/// Derive the envelope key for an environment.
pub fn derive_key(identity: &EnvironmentIdentity, salt: &EncryptionSalt) -> DerivedKey {
    let mut hasher = Sha256::new();
    hasher.update(identity.expose().as_bytes());
    hasher.update(salt.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&hasher.finalize());
    DerivedKey(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(identity: &str, salt: &str) -> DerivedKey {
        derive_key(
            &EnvironmentIdentity::new(identity),
            &EncryptionSalt::new(salt.as_bytes()),
        )
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            hex::encode(key("host-42", "deadbeef").as_bytes()),
            "06db1a76d762d3430233f84956fffa02633743bbd6417e4c757c50a55fd5e932"
        );
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            key("host-42", "deadbeef").as_bytes(),
            key("host-42", "deadbeef").as_bytes()
        );
    }

    #[test]
    fn test_identity_and_salt_both_matter() {
        let base = key("host-42", "deadbeef");
        assert_ne!(base.as_bytes(), key("host-43", "deadbeef").as_bytes());
        assert_ne!(base.as_bytes(), key("host-42", "deadbeee").as_bytes());
    }

    #[test]
    fn test_debug_shows_fingerprint_only() {
        let k = key("host-42", "deadbeef");
        let rendered = format!("{k:?}");
        assert!(rendered.starts_with("DerivedKey(fp="));
        assert!(!rendered.contains("06db1a76"));
    }
}
