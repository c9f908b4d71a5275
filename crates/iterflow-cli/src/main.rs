use std::io;
use std::process::ExitCode;

use clap::Parser;
use iterflow_algo::TerminalState;
use iterflow_cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

fn init_tracing(level: tracing::Level) {
    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Run(args) => {
            let terminal = commands::run::handle(args)?;
            Ok(if terminal == TerminalState::SolveFailed {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Validate {
            dataset,
            slot_minutes,
            json,
        } => {
            let clean = commands::validate::handle(dataset, *slot_minutes, *json)?;
            Ok(if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Config { config } => {
            commands::config::handle(config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
