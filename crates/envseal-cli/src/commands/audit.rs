//! `envseal audit`: look for secrets left on disk.

use clap::Args;
use envseal_audit::{Auditor, CliInspector, ContainerInspector};
use envseal_core::Config;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::render;

/// Audit command arguments.
#[derive(Args)]
pub struct AuditArgs {
    /// Filesystem roots to scan (defaults to audit.roots)
    pub roots: Vec<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also check running containers for the expected variables
    #[arg(long)]
    pub containers: bool,

    /// Inspect only this container (repeatable; implies --containers)
    #[arg(long = "container", value_name = "NAME")]
    pub container: Vec<String>,
}

/// Run the audit command. Exits 1 when anything is found.
pub async fn run(args: AuditArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let roots = if args.roots.is_empty() {
        config.audit.roots.clone()
    } else {
        args.roots
    };

    let mut auditor = Auditor::from_config(&config.audit, &config.artifacts)?;
    let inspect = args.containers || !args.container.is_empty();
    if !args.container.is_empty() {
        auditor = auditor.with_containers(args.container);
    }

    let inspector = CliInspector::new(config.audit.container_runtime.clone());
    let inspector: Option<&dyn ContainerInspector> = if inspect { Some(&inspector) } else { None };
    let report = auditor.audit(&roots, inspector).await?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        render::render_audit(&report);
    }
    Ok(report.exit_status().into())
}
