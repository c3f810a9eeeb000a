//! Terminal rendering utilities.
//!
//! Tables go to stdout; prompts and warnings go to stderr.

use console::{style, Emoji, Term};
use envseal_audit::{AuditReport, Violation};
use envseal_rotation::{Confirm, RotationPlan, RotationState, RotationSummary};
use std::io::IsTerminal;

pub static CHECK: Emoji = Emoji("✓", "+");
pub static CROSS: Emoji = Emoji("✗", "x");
pub static WARN: Emoji = Emoji("⚠", "!");

/// Print an audit report as a violation list with totals.
pub fn render_audit(report: &AuditReport) {
    if report.is_clean() {
        println!(
            "{} No plaintext secrets found ({} file(s), {} container(s) checked)",
            style(CHECK).green(),
            report.files_scanned,
            report.containers_checked
        );
        return;
    }

    println!("{:<22} {}", "KIND", "LOCATION");
    println!("{}", "-".repeat(72));
    for violation in &report.violations {
        let kind = match violation {
            Violation::PlaintextFile { .. } => "plaintext-file",
            Violation::SecretAssignment { .. } => "secret-assignment",
            Violation::MissingContainerVar { .. } => "missing-container-var",
            Violation::ContainerUnavailable { .. } => "container-unavailable",
        };
        println!("{:<22} {}", style(kind).red(), violation);
    }
    println!(
        "\n{} {} violation(s) ({} file(s), {} container(s) checked)",
        style(CROSS).red(),
        report.violations.len(),
        report.files_scanned,
        report.containers_checked
    );
}

/// Print the per-credential rotation table.
pub fn render_summary(summary: &RotationSummary) {
    println!(
        "{:<24} {:<22} {:<28} {:>8}",
        "CREDENTIAL", "STATE", "STORES", "TIME"
    );
    println!("{}", "-".repeat(86));
    for report in &summary.reports {
        let state = match report.state {
            RotationState::Done => style(report.state.to_string()).green(),
            RotationState::PartiallyPropagated => style(report.state.to_string()).yellow(),
            _ => style(report.state.to_string()).red(),
        };
        let stores = if report.stores.is_empty() {
            "-".to_string()
        } else {
            report
                .stores
                .iter()
                .map(|o| format!("{}:{}", o.store, if o.confirmed { "ok" } else { "FAILED" }))
                .collect::<Vec<_>>()
                .join(" ")
        };
        println!(
            "{:<24} {:<22} {:<28} {:>6}ms",
            report.credential, state, stores, report.duration_ms
        );
        if let Some(error) = &report.error {
            println!("  {}", style(error).dim());
        }
    }

    let total = summary.reports.len();
    let done = summary.count(RotationState::Done);
    let icon = if done == total {
        style(CHECK).green()
    } else {
        style(CROSS).red()
    };
    println!(
        "\n{} {}: {}/{} done, {} partially propagated, {} failed",
        icon,
        summary.environment,
        done,
        total,
        summary.count(RotationState::PartiallyPropagated),
        summary.count(RotationState::Failed)
    );
}

/// Stderr banner shown every time the unencrypted bundle is used.
pub fn render_fallback_banner(path: &std::path::Path) {
    eprintln!(
        "{} {} no envelope found, using plaintext bundle {}",
        style(WARN).yellow(),
        style("DEGRADED:").yellow().bold(),
        path.display()
    );
}

/// Interactive yes/no gate before any store is touched.
///
/// Declines when stdin is not a terminal.
pub struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&self, plan: &RotationPlan) -> bool {
        let term = Term::stderr();
        if !std::io::stdin().is_terminal() || !term.is_term() {
            eprintln!(
                "{} not a terminal; pass --yes or set ENVSEAL_AUTO_APPROVE to rotate",
                style(WARN).yellow()
            );
            return false;
        }

        eprintln!("{}", plan);
        eprint!(
            "{} ",
            style(format!(
                "Rotate {} credential(s) in {}? [y/N]",
                plan.rotations.len(),
                plan.environment
            ))
            .bold()
        );

        match term.read_line() {
            Ok(input) => matches!(input.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}
