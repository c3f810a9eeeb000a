//! Audit error types.

use envseal_core::{Classify, ExitStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop an audit from producing a report.
///
/// Findings are not errors; they are [`crate::Violation`]s in the report.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Audit root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Container runtime error: {0}")]
    Container(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for AuditError {
    fn exit_status(&self) -> ExitStatus {
        match self {
            Self::InvalidPattern { .. } | Self::RootNotFound(_) => ExitStatus::Usage,
            _ => ExitStatus::Failure,
        }
    }
}

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
