use anyhow::{bail, Context, Result};
use iterflow_algo::{IterationController, TerminalState};
use iterflow_cli::RunArgs;
use iterflow_core::Severity;
use iterflow_io::{load_scenario, write_outputs};
use tracing::{info, warn};

use super::config::load_config;

pub fn handle(args: &RunArgs) -> Result<TerminalState> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(solver) = &args.solver {
        config.oracle.backend = solver.trim().to_ascii_lowercase();
    }
    if let Some(iterations) = args.max_iterations {
        config.max_iterations = iterations;
    }
    config.validate().context("invalid configuration")?;

    let import = load_scenario(&args.dataset.paths(), config.slot_minutes)?;
    for issue in &import.diagnostics.issues {
        match issue.severity {
            Severity::Warning => warn!("{issue}"),
            Severity::Error => tracing::error!("{issue}"),
        }
    }
    if import.diagnostics.has_errors() {
        bail!("dataset rejected: {}", import.diagnostics.summary());
    }

    let controller = IterationController::from_config(config)?;
    info!(oracle = controller.oracle_id(), "solving");
    let outcome = controller.run(&import.scenario)?;
    let written = write_outputs(&args.out, &outcome, controller.oracle_id())?;

    println!("Terminal state: {}", outcome.terminal);
    println!(
        "{:>9}  {:>14}  {:>9}  {:>9}  {:>10}  {:>8}",
        "iteration", "TSTT", "change", "assigned%", "unmet", "status"
    );
    for (summary, record) in outcome.iterations.iter().zip(&outcome.trace) {
        let change = record
            .relative_change
            .map_or_else(|| "-".to_string(), |c| format!("{:.4}", c));
        println!(
            "{:>9}  {:>14.2}  {:>9}  {:>9.2}  {:>10.2}  {:>8}",
            summary.iteration,
            summary.tstt,
            change,
            summary.assignment_rate,
            summary.unmet,
            summary.status
        );
    }
    if let Some(failure) = &outcome.failure {
        println!("Failure: {failure}");
    }
    println!("Results written to {} ({} files)", args.out.display(), written.len());
    Ok(outcome.terminal)
}
