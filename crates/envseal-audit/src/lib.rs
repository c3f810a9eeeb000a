//! Disk-residue auditor.
//!
//! A detective control run after materialization: it looks for plaintext
//! secret files and `NAME=value` secret assignments under the given roots,
//! and checks that running containers received the variables they should
//! have. Matched values are never recorded, only file paths, line numbers
//! and variable names.

pub mod auditor;
pub mod containers;
pub mod error;
pub mod patterns;
pub mod report;
pub mod scanner;

pub use auditor::Auditor;
pub use containers::{CliInspector, ContainerInspector};
pub use error::{AuditError, Result};
pub use patterns::PatternSet;
pub use report::{AuditReport, Violation};
pub use scanner::Scanner;
