//! envseal command-line interface.

pub mod commands;
pub mod render;

use clap::{Parser, Subcommand};
use envseal_audit::AuditError;
use envseal_core::{Classify, Config, ConfigError, ExitStatus};
use envseal_rotation::RotationError;
use envseal_secrets::SecretError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// envseal - environment-bound secrets and credential rotation
#[derive(Parser)]
#[command(name = "envseal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true, env = "ENVSEAL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Seal a plaintext bundle into an envelope
    Encrypt(commands::encrypt::EncryptArgs),

    /// Open an envelope and print the bundle
    Decrypt(commands::decrypt::DecryptArgs),

    /// Open the envelope and run a command with the secrets in its environment
    #[command(visible_alias = "materialize-and-run")]
    Run(commands::run::RunArgs),

    /// Scan for plaintext secrets left on disk or missing from containers
    Audit(commands::audit::AuditArgs),

    /// Rotate credentials across the identity provider and secret stores
    Rotate(commands::rotate::RotateArgs),

    /// Run diagnostics
    Doctor(commands::doctor::DoctorArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let explicit = cli.config.as_deref();
    match cli.command {
        Commands::Encrypt(args) => commands::encrypt::run(args, &load_config(explicit)?).await,
        Commands::Decrypt(args) => commands::decrypt::run(args, &load_config(explicit)?).await,
        Commands::Run(args) => commands::run::run(args, &load_config(explicit)?).await,
        Commands::Audit(args) => commands::audit::run(args, &load_config(explicit)?).await,
        Commands::Rotate(args) => commands::rotate::run(args, &load_config(explicit)?).await,
        Commands::Doctor(args) => commands::doctor::run(args, explicit).await,
        Commands::Config(args) => commands::config::run(args, explicit).await,
        Commands::Version => {
            println!("envseal {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitStatus::Success.into())
        }
    }
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let config = Config::load_or_default(explicit)?;
    config.validate()?;
    Ok(config)
}

/// Exit status for an error that escaped a command.
///
/// Library errors know whether they are usage or runtime problems; anything
/// else is a runtime failure.
pub fn error_exit_status(err: &anyhow::Error) -> ExitStatus {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SecretError>() {
            return e.exit_status();
        }
        if let Some(e) = cause.downcast_ref::<AuditError>() {
            return e.exit_status();
        }
        if let Some(e) = cause.downcast_ref::<RotationError>() {
            return e.exit_status();
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return e.exit_status();
        }
    }
    ExitStatus::Failure
}
