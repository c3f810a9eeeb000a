//! `envseal encrypt`: seal a plaintext bundle for this environment.

use anyhow::Context;
use clap::Args;
use console::style;
use envseal_core::{Config, ExitStatus};
use envseal_secrets::{artifacts, derive_key, identity, Envelope, SecretsBundle};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use zeroize::Zeroizing;

use crate::render::CHECK;

/// Encrypt command arguments.
#[derive(Args)]
pub struct EncryptArgs {
    /// Plaintext bundle (dotenv or a flat JSON object)
    pub input: PathBuf,

    /// Envelope to write (defaults to the configured envelope path)
    pub output: Option<PathBuf>,

    /// Salt file (defaults to the one beside the envelope)
    #[arg(long)]
    pub salt: Option<PathBuf>,

    /// Generate a fresh salt; refused while an envelope sealed with the old one exists
    #[arg(long)]
    pub new_salt: bool,

    /// Delete the plaintext input once the envelope is written
    #[arg(long)]
    pub remove_input: bool,
}

/// Run the encrypt command.
pub async fn run(args: EncryptArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let paths = super::artifact_paths(config, args.output, args.salt);

    let text = Zeroizing::new(
        std::fs::read_to_string(&args.input)
            .with_context(|| format!("Failed to read {}", args.input.display()))?,
    );
    let bundle = SecretsBundle::parse_input(&text)?;
    if bundle.is_empty() {
        anyhow::bail!("{} contains no secrets", args.input.display());
    }

    let identity = identity::from_config(&config.identity)?.fetch().await?;

    let salt = if args.new_salt {
        artifacts::create_new_salt(&paths.salt, &paths.envelope)?
    } else {
        let (salt, created) = artifacts::load_or_create_salt(&paths.salt, &paths.envelope)?;
        if created {
            info!(salt = %paths.salt.display(), "created new salt");
        }
        salt
    };

    let key = derive_key(&identity, &salt);
    let envelope = Envelope::seal(&bundle, &key)?;
    artifacts::write_envelope(&paths.envelope, &envelope)?;

    if args.remove_input {
        std::fs::remove_file(&args.input)
            .with_context(|| format!("Failed to remove {}", args.input.display()))?;
    }

    println!(
        "{} Sealed {} secret(s) into {}",
        style(CHECK).green(),
        bundle.len(),
        paths.envelope.display()
    );
    Ok(ExitStatus::Success.into())
}
