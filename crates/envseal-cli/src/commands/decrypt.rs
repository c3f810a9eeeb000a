//! `envseal decrypt`: print the opened bundle.

use clap::Args;
use envseal_core::{Config, ExitStatus};
use envseal_secrets::{identity, Materializer, SecretsBundle};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use zeroize::Zeroizing;

/// Decrypt command arguments.
#[derive(Args)]
pub struct DecryptArgs {
    /// Envelope to open (defaults to the configured envelope path)
    pub envelope: Option<PathBuf>,

    /// Salt file (defaults to the one beside the envelope)
    #[arg(long)]
    pub salt: Option<PathBuf>,

    /// Print `export KEY='value'` lines for `eval`
    #[arg(long)]
    pub export: bool,
}

/// Run the decrypt command.
///
/// Never falls back to the plaintext bundle: a decrypt that cannot open the
/// envelope is an error.
pub async fn run(args: DecryptArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let paths = super::artifact_paths(config, args.envelope, args.salt);
    let materializer =
        Materializer::new(paths).with_required_keys(config.materialize.required_keys.clone());

    let identity = identity::from_config(&config.identity)?.fetch().await?;
    let bundle = materializer.open_with(&identity)?;

    let out = format_bundle(&bundle, args.export);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(out.as_bytes())?;
    stdout.flush()?;
    Ok(ExitStatus::Success.into())
}

fn format_bundle(bundle: &SecretsBundle, export: bool) -> Zeroizing<String> {
    if !export {
        return bundle.to_lines();
    }
    let mut out = Zeroizing::new(String::new());
    for (key, value) in bundle.iter() {
        out.push_str("export ");
        out.push_str(key);
        out.push_str("='");
        out.push_str(&value.expose_secret().replace('\'', r"'\''"));
        out.push_str("'\n");
    }
    out
}
