//! Rotation error types.

use envseal_core::{Classify, ExitStatus};
use std::time::Duration;
use thiserror::Error;

use crate::credential::StoreKind;
use crate::state::RotationState;

/// Errors raised while planning or executing a rotation.
///
/// Store errors carry the store and a short message; request bodies that
/// could contain secret values are never included.
#[derive(Debug, Error)]
pub enum RotationError {
    /// A store returned a non-success response.
    #[error("{store} API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    ExternalApi {
        store: StoreKind,
        status: Option<u16>,
        message: String,
    },

    /// Rejected credentials (401/403). Never retried.
    #[error("{store} authentication failed: {message}")]
    Auth { store: StoreKind, message: String },

    /// Connection-level failure.
    #[error("{store} network error: {message}")]
    Network { store: StoreKind, message: String },

    #[error("{store} call timed out after {after:?}")]
    Timeout { store: StoreKind, after: Duration },

    /// The authoritative store rotated but some secondaries did not confirm.
    #[error("Partial propagation for: {}", .credentials.join(", "))]
    PartialPropagation { credentials: Vec<String> },

    /// The authoritative rotation failed; nothing was changed.
    #[error("Rotation failed for: {}", .credentials.join(", "))]
    Failed { credentials: Vec<String> },

    #[error("Unknown credential(s): {}", .0.join(", "))]
    UnknownCredential(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rotation not confirmed; nothing was changed")]
    NotConfirmed,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: RotationState,
        to: RotationState,
    },
}

impl RotationError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::ExternalApi {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The store involved, if any.
    pub fn store(&self) -> Option<StoreKind> {
        match self {
            Self::ExternalApi { store, .. }
            | Self::Auth { store, .. }
            | Self::Network { store, .. }
            | Self::Timeout { store, .. } => Some(*store),
            _ => None,
        }
    }
}

impl Classify for RotationError {
    fn exit_status(&self) -> ExitStatus {
        match self {
            Self::UnknownCredential(_) | Self::Config(_) => ExitStatus::Usage,
            _ => ExitStatus::Failure,
        }
    }
}

/// Result type for rotation operations.
pub type Result<T> = std::result::Result<T, RotationError>;
