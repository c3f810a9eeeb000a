//! AES-256-GCM envelope codec.
//!
//! An envelope is `(iv, ciphertext)` where the ciphertext carries the GCM
//! tag. Its persisted form is a single line `<hex iv>:<base64 ciphertext>`.
//! A fresh random IV is generated for every seal, so sealing the same bundle
//! twice never yields the same envelope.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::bundle::SecretsBundle;
use crate::error::{Result, SecretError};
use crate::kdf::DerivedKey;

/// GCM nonce length in bytes.
pub const IV_SIZE: usize = 12;

/// GCM authentication tag length in bytes.
const TAG_SIZE: usize = 16;

/// The persisted ciphertext artifact.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    iv: [u8; IV_SIZE],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encrypt `bundle` under `key` with a freshly generated IV.
    pub fn seal(bundle: &SecretsBundle, key: &DerivedKey) -> Result<Self> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| SecretError::EncryptionFailed(e.to_string()))?;

        let plaintext = bundle.to_lines();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| SecretError::EncryptionFailed(e.to_string()))?;

        Ok(Self { iv, ciphertext })
    }

    /// Decrypt and parse the bundle.
    ///
    /// Fails with [`SecretError::DecryptionFailed`] when the tag does not
    /// verify (wrong identity, wrong salt, or tampering) or when the
    /// plaintext is not a well-formed bundle.
    pub fn open(&self, key: &DerivedKey) -> Result<SecretsBundle> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| SecretError::DecryptionFailed(e.to_string()))?;

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&self.iv), self.ciphertext.as_slice())
                .map_err(|_| {
                    SecretError::DecryptionFailed(
                        "authentication tag mismatch (wrong identity or salt, or tampered envelope)"
                            .to_string(),
                    )
                })?,
        );

        let text = std::str::from_utf8(&plaintext).map_err(|_| {
            SecretError::DecryptionFailed("plaintext is not valid UTF-8".to_string())
        })?;
        SecretsBundle::parse_strict(text).map_err(|_| {
            SecretError::DecryptionFailed("plaintext is not a well-formed bundle".to_string())
        })
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Persisted single-line form.
    pub fn encode(&self) -> String {
        format!("{}:{}", hex::encode(self.iv), STANDARD.encode(&self.ciphertext))
    }

    /// Parse the persisted form. A trailing newline is tolerated.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (iv_hex, ct_b64) = s
            .split_once(':')
            .ok_or_else(|| SecretError::InvalidEnvelope("expected <iv>:<ciphertext>".to_string()))?;

        let iv_bytes = hex::decode(iv_hex)
            .map_err(|e| SecretError::InvalidEnvelope(format!("iv is not hex: {e}")))?;
        let iv: [u8; IV_SIZE] = iv_bytes.try_into().map_err(|v: Vec<u8>| {
            SecretError::InvalidEnvelope(format!("iv must be {IV_SIZE} bytes, got {}", v.len()))
        })?;

        let ciphertext = STANDARD
            .decode(ct_b64)
            .map_err(|e| SecretError::InvalidEnvelope(format!("ciphertext is not base64: {e}")))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(SecretError::InvalidEnvelope("ciphertext too short".to_string()));
        }

        Ok(Self { iv, ciphertext })
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("iv", &hex::encode(self.iv))
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

impl FromStr for Envelope {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_key;
    use crate::types::{EncryptionSalt, EnvironmentIdentity};

    fn key_for(identity: &str) -> DerivedKey {
        derive_key(
            &EnvironmentIdentity::new(identity),
            &EncryptionSalt::new(b"deadbeef".to_vec()),
        )
    }

    fn sample() -> SecretsBundle {
        SecretsBundle::from_pairs([("DB_PASSWORD", "abc123"), ("API_KEY", "xyz789")]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let key = key_for("host-42");
        let envelope = Envelope::seal(&sample(), &key).unwrap();
        let parsed = Envelope::parse(&envelope.encode()).unwrap();
        let bundle = parsed.open(&key).unwrap();

        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get("DB_PASSWORD").unwrap().expose_secret(), "abc123");
        assert_eq!(bundle.get("API_KEY").unwrap().expose_secret(), "xyz789");
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let key = key_for("host-42");
        let a = Envelope::seal(&sample(), &key).unwrap();
        let b = Envelope::seal(&sample(), &key).unwrap();

        assert_ne!(a.iv(), b.iv());
        assert_ne!(a.encode(), b.encode());
        assert_eq!(a.open(&key).unwrap(), b.open(&key).unwrap());
    }

    #[test]
    fn test_wrong_identity_fails() {
        let envelope = Envelope::seal(&sample(), &key_for("host-42")).unwrap();
        let result = envelope.open(&key_for("host-43"));
        assert!(matches!(result, Err(SecretError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = key_for("host-42");
        let mut envelope = Envelope::seal(&sample(), &key).unwrap();
        envelope.ciphertext[0] ^= 0xff;
        assert!(matches!(
            envelope.open(&key),
            Err(SecretError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_encoded_form() {
        let envelope = Envelope::seal(&sample(), &key_for("host-42")).unwrap();
        let encoded = envelope.encode();
        let (iv, ct) = encoded.split_once(':').unwrap();
        assert_eq!(iv.len(), IV_SIZE * 2);
        assert!(STANDARD.decode(ct).is_ok());
        assert!(!encoded.contains("abc123"));
        assert_eq!(Envelope::parse(&format!("{encoded}\n")).unwrap(), envelope);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            Envelope::parse("no-separator"),
            Err(SecretError::InvalidEnvelope(_))
        ));
        assert!(Envelope::parse("zz:AAAA").is_err());
        assert!(Envelope::parse("00112233:AAAAAAAAAAAAAAAAAAAAAA==").is_err());
        assert!(Envelope::parse("001122334455667788990011:AAAA").is_err());
    }

    #[test]
    fn test_empty_bundle_round_trip() {
        let key = key_for("host-42");
        let envelope = Envelope::seal(&SecretsBundle::new(), &key).unwrap();
        assert!(envelope.open(&key).unwrap().is_empty());
    }
}
