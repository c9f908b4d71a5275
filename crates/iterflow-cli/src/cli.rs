use clap::{Args, Parser, Subcommand, ValueHint};
use iterflow_io::DatasetPaths;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iterflow", author, version, about, long_about = None)]
pub struct Cli {
    /// Logging level used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the iterative assignment and write results
    Run(RunArgs),
    /// Load a dataset and report data-quality issues
    Validate {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// Slot width in minutes used to convert hourly capacities
        #[arg(long, default_value_t = 15.0)]
        slot_minutes: f64,
        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Configuration file layered over the defaults
        #[arg(long, value_hint = ValueHint::FilePath)]
        config: Option<PathBuf>,
    },
}

/// Input files of one dataset.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Link table (from,to,capacity,fftt)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub links: PathBuf,
    /// Wide trip table with path_k columns
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub trips: PathBuf,
    /// Optional node table (id,name,x,y)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub nodes: Option<PathBuf>,
    /// Background traffic JSON ({"from,to": {"slot": vehicles}})
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub background: Option<PathBuf>,
}

impl DatasetArgs {
    pub fn paths(&self) -> DatasetPaths {
        DatasetPaths {
            links: self.links.clone(),
            trips: self.trips.clone(),
            nodes: self.nodes.clone(),
            background: self.background.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
    /// TOML configuration layered over the defaults; environment wins
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Output directory
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub out: PathBuf,
    /// LP solver backend (overrides config and LP_SOLVER)
    #[arg(long)]
    pub solver: Option<String>,
    /// Maximum iterations (overrides config and MAX_ITERATIONS)
    #[arg(long)]
    pub max_iterations: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "iterflow", "run", "--links", "l.csv", "--trips", "t.csv", "--out", "out",
            "--solver", "good_lp",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.dataset.links, PathBuf::from("l.csv"));
                assert_eq!(args.solver.as_deref(), Some("good_lp"));
                assert!(args.dataset.background.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
