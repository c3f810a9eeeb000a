//! Encrypted secrets bundle handling for envseal.
//!
//! A per-environment key is derived from an unforgeable environment identity
//! and a persisted salt ([`kdf`]); the secrets bundle is sealed into an
//! AES-256-GCM envelope ([`envelope`]); at service startup the
//! [`materialize::Materializer`] opens the envelope and hands the values to a
//! child process through its environment ([`launch`]), never through durable
//! storage.

pub mod artifacts;
pub mod bundle;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod launch;
pub mod materialize;
pub mod types;

pub use artifacts::ArtifactPaths;
pub use bundle::SecretsBundle;
pub use envelope::Envelope;
pub use error::{Result, SecretError};
pub use identity::{IdentitySource, MetadataIdentity, StaticIdentity, ToolingIdentity};
pub use kdf::{derive_key, DerivedKey};
pub use launch::{LaunchOutcome, ScopedLaunch, ShutdownSignals, VolatileEnvFile};
pub use materialize::{BundleSource, Materialized, Materializer};
pub use types::{EncryptionSalt, EnvironmentIdentity};
