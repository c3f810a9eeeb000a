//! Diagnostic commands.

use clap::Args;
use console::style;
use envseal_core::{Config, ConfigError, ExitStatus};
use envseal_secrets::launch::is_memory_backed;
use envseal_secrets::{artifacts, identity, ArtifactPaths, Materializer};
use std::path::Path;
use std::process::ExitCode;

use crate::render::{CHECK, CROSS, WARN};

/// Doctor command arguments.
#[derive(Args)]
pub struct DoctorArgs {
    /// Skip the identity lookup and the envelope decryption check
    #[arg(long)]
    pub offline: bool,
}

#[derive(Default)]
struct Tally {
    errors: usize,
    warnings: usize,
}

impl Tally {
    fn ok(&self, message: impl std::fmt::Display) {
        println!("  {} {}", style(CHECK).green(), message);
    }

    fn warn(&mut self, message: impl std::fmt::Display) {
        println!("  {} {}", style(WARN).yellow(), message);
        self.warnings += 1;
    }

    fn fail(&mut self, message: impl std::fmt::Display) {
        println!("  {} {}", style(CROSS).red(), message);
        self.errors += 1;
    }
}

/// Run the doctor command. Secret values are never printed.
pub async fn run(args: DoctorArgs, explicit: Option<&Path>) -> anyhow::Result<ExitCode> {
    println!("envseal doctor\n");
    let mut tally = Tally::default();

    println!("Checking configuration...");
    let config = match Config::load_or_default(explicit) {
        Ok(config) => {
            tally.ok("Configuration loaded");
            match config.validate() {
                Ok(()) => tally.ok("Configuration valid"),
                Err(e) => tally.fail(format!("Configuration invalid: {e}")),
            }
            config
        }
        Err(ConfigError::NotFound(path)) => {
            tally.fail(format!("Configuration file not found: {}", path.display()));
            println!("    Run 'envseal config init' to create one");
            return Ok(summarize(&tally));
        }
        Err(e) => {
            tally.fail(format!("Configuration error: {e}"));
            return Ok(summarize(&tally));
        }
    };

    println!("\nChecking artifacts...");
    let paths = ArtifactPaths::from(&config.artifacts);
    check_private_file(&mut tally, "Envelope", &paths.envelope);
    check_private_file(&mut tally, "Salt", &paths.salt);
    if paths.plaintext.exists() {
        tally.warn(format!(
            "Plaintext bundle present: {} (run 'envseal audit')",
            paths.plaintext.display()
        ));
    }

    println!("\nChecking volatile directory...");
    let volatile = config.materialize.volatile_dir();
    if !volatile.is_dir() {
        tally.warn(format!("{} does not exist", volatile.display()));
    } else if is_memory_backed(&volatile) {
        tally.ok(format!("{} is memory-backed", volatile.display()));
    } else if config.materialize.require_memory_backed {
        tally.fail(format!("{} is not memory-backed (--env-file will refuse it)", volatile.display()));
    } else {
        tally.warn(format!("{} is not memory-backed", volatile.display()));
    }

    if !args.offline {
        println!("\nChecking environment identity...");
        let identity = match identity::from_config(&config.identity) {
            Ok(source) => match source.fetch().await {
                Ok(identity) => {
                    tally.ok(format!("Identity available from {} source", source.name()));
                    Some(identity)
                }
                Err(e) => {
                    tally.fail(e);
                    None
                }
            },
            Err(e) => {
                tally.fail(e);
                None
            }
        };

        if let (Some(identity), true) = (identity, paths.envelope.exists()) {
            println!("\nChecking envelope...");
            let materializer = Materializer::new(paths)
                .with_required_keys(config.materialize.required_keys.clone());
            match materializer.open_with(&identity) {
                Ok(bundle) => tally.ok(format!(
                    "Envelope decrypts with {} key(s), all {} required key(s) present",
                    bundle.len(),
                    config.materialize.required_keys.len()
                )),
                Err(e) => tally.fail(e),
            }
        }
    }

    Ok(summarize(&tally))
}

fn check_private_file(tally: &mut Tally, label: &str, path: &Path) {
    if !path.exists() {
        tally.warn(format!("{label} missing: {}", path.display()));
        return;
    }
    match artifacts::loose_permissions(path) {
        Ok(None) => tally.ok(format!("{label} present with mode 600: {}", path.display())),
        Ok(Some(mode)) => tally.fail(format!(
            "{label} mode is {mode:o}, expected 600: {}",
            path.display()
        )),
        Err(e) => tally.fail(format!("{label} unreadable: {e}")),
    }
}

fn summarize(tally: &Tally) -> ExitCode {
    println!();
    if tally.errors == 0 {
        println!(
            "{} No problems found ({} warning(s))",
            style(CHECK).green(),
            tally.warnings
        );
        ExitStatus::Success.into()
    } else {
        println!(
            "{} {} error(s), {} warning(s)",
            style(CROSS).red(),
            tally.errors,
            tally.warnings
        );
        ExitStatus::Failure.into()
    }
}
