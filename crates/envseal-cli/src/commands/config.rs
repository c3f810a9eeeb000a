//! Configuration management commands.

use clap::Args;
use console::style;
use envseal_core::{Config, ConfigError, ExitStatus};
use std::path::Path;
use std::process::ExitCode;

use crate::render::CHECK;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Validate configuration
    Validate,

    /// Write a configuration file with the defaults
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, explicit: Option<&Path>) -> anyhow::Result<ExitCode> {
    match args.command {
        ConfigCommand::Show => {
            let config = Config::load_or_default(explicit)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        ConfigCommand::Validate => {
            let path = Config::resolve_path(explicit)?;
            let config = Config::load_or_default(explicit)?;
            config.validate()?;
            println!(
                "{} Configuration valid: {}",
                style(CHECK).green(),
                path.display()
            );
        }

        ConfigCommand::Init { force } => {
            let path = Config::resolve_path(explicit)?;
            if path.exists() && !force {
                return Err(ConfigError::Validation(format!(
                    "configuration already exists at {} (use --force to overwrite)",
                    path.display()
                ))
                .into());
            }
            Config::default().save(&path)?;
            println!(
                "{} Configuration written to {}",
                style(CHECK).green(),
                path.display()
            );
        }

        ConfigCommand::Path => {
            println!("{}", Config::resolve_path(explicit)?.display());
        }
    }

    Ok(ExitStatus::Success.into())
}
