//! `envseal rotate`: regenerate credentials and propagate them.

use anyhow::Context;
use clap::{ArgGroup, Args};
use envseal_core::config::Environment;
use envseal_core::env::{self, vars};
use envseal_core::{Config, ExitStatus, SecretString};
use envseal_rotation::stores::{self, KeycloakAuth};
use envseal_rotation::{AutoApprove, Confirm, Orchestrator, RotationPlan, Selection, StoreSecrets};
use std::io::IsTerminal;
use std::process::ExitCode;
use std::time::Duration;

use crate::render::{self, PromptConfirm};

/// Rotate command arguments.
#[derive(Args)]
#[command(group(ArgGroup::new("selection").required(true).args(["credential", "all"])))]
pub struct RotateArgs {
    /// Credential to rotate (repeatable)
    #[arg(long, value_name = "NAME")]
    pub credential: Vec<String>,

    /// Rotate every configured credential
    #[arg(long)]
    pub all: bool,

    /// Print the plan without contacting any store
    #[arg(long)]
    pub dry_run: bool,

    /// Target environment
    #[arg(long, default_value = "dev")]
    pub env: Environment,

    /// Skip the confirmation prompt (also ENVSEAL_AUTO_APPROVE=1)
    #[arg(short, long)]
    pub yes: bool,

    /// Print the plan or summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the rotate command.
///
/// Exits 1 unless every credential ends `done`; the summary is printed
/// either way.
pub async fn run(args: RotateArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let selection = if args.all {
        Selection::All
    } else {
        Selection::Named(args.credential)
    };
    let plan = RotationPlan::build(config, args.env, &selection)?;

    if args.dry_run {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            println!("{plan}");
            println!("Dry run: nothing was changed.");
        }
        return Ok(ExitStatus::Success.into());
    }

    let env_config = config.environment(args.env)?;
    let mut secrets = StoreSecrets::resolve(env_config, env::get_var);
    if secrets.keycloak.is_none()
        && env_config.keycloak.client_secret_env.is_none()
        && std::io::stdin().is_terminal()
    {
        let password = rpassword::prompt_password(format!(
            "Keycloak admin password for '{}': ",
            env_config.keycloak.admin_user
        ))
        .context("Failed to read password")?;
        if !password.is_empty() {
            secrets.keycloak = Some(KeycloakAuth::Password {
                username: env_config.keycloak.admin_user.clone(),
                password: SecretString::new(password),
            });
        }
    }

    let stores = stores::build(
        env_config,
        secrets,
        Duration::from_secs(config.rotation.timeout_secs),
    )?;
    let orchestrator = Orchestrator::from_config(stores, &config.rotation);

    let confirm: &dyn Confirm = if args.yes || env::get_bool(vars::ENVSEAL_AUTO_APPROVE) {
        &AutoApprove
    } else {
        &PromptConfirm
    };
    let summary = orchestrator.execute(&plan, confirm).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        render::render_summary(&summary);
    }
    Ok(summary.exit_status().into())
}
