//! Error types and exit-code classification shared by all envseal crates.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON5 parse error: {0}")]
    Json5(String),

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),
}

/// Process exit status of the `envseal` binary.
///
/// `0` means success, `1` a detected violation, partial propagation or a
/// runtime failure, `2` a usage or configuration problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
    Usage,
}

impl ExitStatus {
    /// Numeric process exit code.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Usage => 2,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

/// Errors that know which exit status they should produce.
pub trait Classify {
    fn exit_status(&self) -> ExitStatus;
}

impl Classify for ConfigError {
    fn exit_status(&self) -> ExitStatus {
        ExitStatus::Usage
    }
}
