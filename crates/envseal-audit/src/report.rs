//! Audit report.

use envseal_core::ExitStatus;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A single finding. Carries names and locations, never values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A file whose name marks it as a plaintext secrets file.
    PlaintextFile { path: PathBuf, pattern: String },

    /// A `NAME=value` secret assignment with a literal value.
    SecretAssignment {
        path: PathBuf,
        line: usize,
        name: String,
    },

    /// A running container lacks a variable the materializer should have set.
    MissingContainerVar { container: String, name: String },

    /// A container named for inspection could not be inspected.
    ContainerUnavailable { container: String, reason: String },
}

impl Violation {
    /// Files by path then line, containers after files.
    fn location(&self) -> (u8, String, usize) {
        match self {
            Self::PlaintextFile { path, .. } => (0, path.to_string_lossy().into_owned(), 0),
            Self::SecretAssignment { path, line, .. } => {
                (0, path.to_string_lossy().into_owned(), *line)
            }
            Self::MissingContainerVar { container, .. }
            | Self::ContainerUnavailable { container, .. } => (1, container.clone(), 0),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlaintextFile { path, pattern } => {
                write!(f, "{}: plaintext secrets file ({pattern})", path.display())
            }
            Self::SecretAssignment { path, line, name } => {
                write!(f, "{}:{line}: secret assignment {name}", path.display())
            }
            Self::MissingContainerVar { container, name } => {
                write!(f, "container {container}: missing {name}")
            }
            Self::ContainerUnavailable { container, reason } => {
                write!(f, "container {container}: not inspectable ({reason})")
            }
        }
    }
}

/// Outcome of an audit run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub violations: Vec<Violation>,
    pub files_scanned: usize,
    pub containers_checked: usize,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Non-zero whenever anything was found, so the audit works as a gate.
    pub fn exit_status(&self) -> ExitStatus {
        if self.is_clean() {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }

    /// Sort and drop duplicates from overlapping roots.
    pub(crate) fn normalize(&mut self) {
        self.violations
            .sort_by(|a, b| a.location().cmp(&b.location()).then_with(|| a.cmp(b)));
        self.violations.dedup();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
