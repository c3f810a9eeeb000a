//! envseal CLI entry point.

use clap::Parser;
use console::style;
use envseal_cli::{error_exit_status, run, Cli};
use envseal_core::env::{self, vars};
use envseal_core::ExitStatus;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitStatus::Usage.into()
            } else {
                ExitStatus::Success.into()
            };
        }
    };

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            error_exit_status(&e).into()
        }
    }
}

/// Logs go to stderr so `decrypt` output on stdout stays clean.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn,envseal=info",
        1 => "warn,envseal=debug",
        _ => "warn,envseal=trace",
    };
    let filter = env::get_var(vars::ENVSEAL_LOG)
        .or_else(|| env::get_var("RUST_LOG"))
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
