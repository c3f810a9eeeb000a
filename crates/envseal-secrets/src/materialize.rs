//! Service-startup materialization.
//!
//! Obtains the identity, derives the key, opens the envelope and checks the
//! result before anything is handed to a child process. A partially usable
//! bundle is never returned.

use envseal_core::env::is_env_var_blocked;
use envseal_core::Config;
use std::fmt;
use std::fs;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::artifacts::{self, ArtifactPaths};
use crate::bundle::SecretsBundle;
use crate::error::{Result, SecretError};
use crate::identity::IdentitySource;
use crate::kdf::derive_key;
use crate::types::EnvironmentIdentity;

/// Where a materialized bundle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleSource {
    Envelope,
    /// Degraded mode: the unencrypted bundle file was read.
    PlaintextFallback,
}

impl fmt::Display for BundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Envelope => write!(f, "envelope"),
            Self::PlaintextFallback => write!(f, "plaintext fallback"),
        }
    }
}

/// A verified bundle ready for injection.
#[derive(Debug)]
pub struct Materialized {
    pub bundle: SecretsBundle,
    pub source: BundleSource,
}

/// Decrypts and verifies the secrets bundle for a service launch.
#[derive(Debug, Clone)]
pub struct Materializer {
    paths: ArtifactPaths,
    required_keys: Vec<String>,
    allow_plaintext_fallback: bool,
}

impl Materializer {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self {
            paths,
            required_keys: Vec::new(),
            allow_plaintext_fallback: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ArtifactPaths::from(&config.artifacts))
            .with_required_keys(config.materialize.required_keys.clone())
            .with_plaintext_fallback(config.materialize.allow_plaintext_fallback)
    }

    pub fn with_required_keys(mut self, keys: Vec<String>) -> Self {
        self.required_keys = keys;
        self
    }

    pub fn with_plaintext_fallback(mut self, allow: bool) -> Self {
        self.allow_plaintext_fallback = allow;
        self
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn required_keys(&self) -> &[String] {
        &self.required_keys
    }

    /// Produce the verified bundle.
    ///
    /// The identity is only consulted when an envelope exists; the degraded
    /// plaintext path needs no key.
    pub async fn materialize(&self, identity: &dyn IdentitySource) -> Result<Materialized> {
        if !self.paths.envelope.exists() {
            return self.plaintext_fallback();
        }

        let identity_value = identity.fetch().await?;
        let bundle = self.open_with(&identity_value)?;
        info!(
            envelope = %self.paths.envelope.display(),
            identity_source = identity.name(),
            keys = bundle.len(),
            "secrets materialized"
        );
        Ok(Materialized {
            bundle,
            source: BundleSource::Envelope,
        })
    }

    /// Open the envelope with an already obtained identity and verify it.
    pub fn open_with(&self, identity: &EnvironmentIdentity) -> Result<SecretsBundle> {
        let envelope = artifacts::read_envelope(&self.paths.envelope)?;
        let salt = artifacts::read_salt(&self.paths.salt)?;
        let key = derive_key(identity, &salt);
        debug!(key = ?key, "derived envelope key");

        let bundle = envelope.open(&key)?;
        self.verify(&bundle)?;
        Ok(bundle)
    }

    /// Check required keys are present and no name is unsafe to inject.
    pub fn verify(&self, bundle: &SecretsBundle) -> Result<()> {
        let missing = bundle.missing(&self.required_keys);
        if !missing.is_empty() {
            return Err(SecretError::MissingSecret(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }
        if let Some(name) = bundle.keys().find(|k| is_env_var_blocked(k)) {
            return Err(SecretError::BlockedName(name.to_string()));
        }
        Ok(())
    }

    fn plaintext_fallback(&self) -> Result<Materialized> {
        if !self.allow_plaintext_fallback || !self.paths.plaintext.exists() {
            return Err(SecretError::EnvelopeMissing(self.paths.envelope.clone()));
        }

        warn!(
            envelope = %self.paths.envelope.display(),
            plaintext = %self.paths.plaintext.display(),
            "no envelope found; DEGRADED MODE: reading unencrypted secrets bundle"
        );
        let text = Zeroizing::new(fs::read_to_string(&self.paths.plaintext)?);
        let bundle = SecretsBundle::parse_dotenv(&text)?;
        self.verify(&bundle)?;
        Ok(Materialized {
            bundle,
            source: BundleSource::PlaintextFallback,
        })
    }
}
