//! # envseal-core
//!
//! Core types, configuration, and utilities for envseal.
//!
//! This crate provides shared functionality used across all envseal crates:
//!
//! - **Configuration**: Loading, validation, and persistence of the JSON5 config file
//! - **Secrets in memory**: [`SecretString`], zeroed on drop and never printed
//! - **Utilities**: Path resolution, environment variable handling, exit codes

pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod secret;

// Re-exports for convenience
pub use config::Config;
pub use error::{Classify, ConfigError, ExitStatus};
pub use secret::SecretString;
