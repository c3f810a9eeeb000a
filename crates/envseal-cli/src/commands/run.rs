//! `envseal run`: materialize the bundle and launch a service with it.

use clap::Args;
use envseal_core::Config;
use envseal_secrets::{
    identity, BundleSource, Materializer, ScopedLaunch, ShutdownSignals, VolatileEnvFile,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

use crate::render;

/// Run command arguments.
#[derive(Args)]
pub struct RunArgs {
    /// Envelope to open (defaults to the configured envelope path)
    pub envelope: Option<PathBuf>,

    /// Salt file (defaults to the one beside the envelope)
    #[arg(long)]
    pub salt: Option<PathBuf>,

    /// Also write the bundle to a memory-backed file; its path replaces
    /// `{env_file}` in the command and is exported as ENVSEAL_ENV_FILE
    #[arg(long)]
    pub env_file: bool,

    /// Remove the env file this many seconds after launch
    /// (defaults to materialize.env_file_grace_secs)
    #[arg(long, value_name = "SECS", requires = "env_file")]
    pub env_file_grace: Option<u64>,

    /// Keep the env file until the command exits
    #[arg(long, requires = "env_file", conflicts_with = "env_file_grace")]
    pub keep_env_file: bool,

    /// Use the plaintext bundle when no envelope exists (degraded mode)
    #[arg(long)]
    pub allow_plaintext_fallback: bool,

    /// Command to run, after `--`
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Run the materialize-and-run command.
///
/// Any failure before launch aborts; the child never starts with a partial
/// environment. The child's exit code becomes ours.
pub async fn run(args: RunArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let paths = super::artifact_paths(config, args.envelope.clone(), args.salt.clone());
    let materializer = Materializer::new(paths)
        .with_required_keys(config.materialize.required_keys.clone())
        .with_plaintext_fallback(
            config.materialize.allow_plaintext_fallback || args.allow_plaintext_fallback,
        );

    let source = identity::from_config(&config.identity)?;
    let materialized = materializer.materialize(source.as_ref()).await?;
    if materialized.source == BundleSource::PlaintextFallback {
        render::render_fallback_banner(&materializer.paths().plaintext);
    }

    // Trapped before the env file exists so a signal drops it instead of
    // ending the process with it on disk.
    let signals = ShutdownSignals::install()?;
    let mut launch = ScopedLaunch::from_argv(&args.command)?;
    if args.env_file {
        let file = VolatileEnvFile::create(
            &config.materialize.volatile_dir(),
            &materialized.bundle,
            config.materialize.require_memory_backed,
        )?;
        launch = launch.with_env_file(file);
        if let Some(grace) = env_file_grace(&args, config) {
            launch = launch.with_env_file_grace(grace);
        }
    }
    let launch = launch.with_signals(signals);

    let outcome = launch.run(&materialized.bundle).await?;
    info!(
        exit_code = outcome.exit_code,
        interrupted = outcome.interrupted,
        duration_ms = outcome.duration_ms,
        "service exited"
    );

    Ok(ExitCode::from(u8::try_from(outcome.exit_code).unwrap_or(1)))
}

/// How long the env file outlives the launch; `None` keeps it until exit.
fn env_file_grace(args: &RunArgs, config: &Config) -> Option<Duration> {
    let keep_by_config =
        config.materialize.keep_env_file_until_exit && args.env_file_grace.is_none();
    if args.keep_env_file || keep_by_config {
        return None;
    }
    let secs = args
        .env_file_grace
        .unwrap_or(config.materialize.env_file_grace_secs);
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(argv: &[&str]) -> RunArgs {
        Harness::try_parse_from(std::iter::once("run").chain(argv.iter().copied()))
            .unwrap()
            .run
    }

    #[test]
    fn test_env_file_grace_defaults_to_config() {
        let mut config = Config::default();
        config.materialize.env_file_grace_secs = 7;

        let args = parse(&["--env-file", "--", "true"]);
        assert_eq!(env_file_grace(&args, &config), Some(Duration::from_secs(7)));

        let args = parse(&["--env-file", "--env-file-grace", "2", "--", "true"]);
        assert_eq!(env_file_grace(&args, &config), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_keep_env_file_is_explicit() {
        let mut config = Config::default();
        let args = parse(&["--env-file", "--keep-env-file", "--", "true"]);
        assert_eq!(env_file_grace(&args, &config), None);

        config.materialize.keep_env_file_until_exit = true;
        let args = parse(&["--env-file", "--", "true"]);
        assert_eq!(env_file_grace(&args, &config), None);

        let args = parse(&["--env-file", "--env-file-grace", "1", "--", "true"]);
        assert_eq!(env_file_grace(&args, &config), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_keep_env_file_conflicts_with_grace() {
        let result = Harness::try_parse_from([
            "run", "--env-file", "--keep-env-file", "--env-file-grace", "1", "--", "true",
        ]);
        assert!(result.is_err());
    }
}
