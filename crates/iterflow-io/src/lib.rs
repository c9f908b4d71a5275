//! # iterflow-io: Dataset Import & Result Export
//!
//! Reads the CSV/JSON datasets an assignment run starts from and writes the
//! files it reports to.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iterflow_io::{load_scenario, DatasetPaths};
//!
//! fn main() -> anyhow::Result<()> {
//!     let import = load_scenario(
//!         &DatasetPaths {
//!             links: "links.csv".into(),
//!             trips: "trips.csv".into(),
//!             ..Default::default()
//!         },
//!         15.0,
//!     )?;
//!     println!("{}", import.diagnostics.summary());
//!     println!("trips: {}", import.scenario.trips.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Outputs
//!
//! | File | Content |
//! |------|---------|
//! | `assignments.csv` | one row per option carrying flow |
//! | `link_statistics.csv` | flow, utilization and delay per link |
//! | `convergence.csv` | TSTT and relative change per iteration |
//! | `flows_by_time.json` | solved flow per link and slot |
//! | `summary.json` | terminal state and per-iteration summaries |

pub mod exporters;
pub mod fields;
pub mod importers;

pub use exporters::{
    cell_flow_totals, demand_totals, read_assignments, write_outputs, RunSummary,
};
pub use importers::{
    load_scenario, read_background, read_scenario_json, write_scenario_json, DatasetPaths,
    ScenarioImport,
};
