use anyhow::{Context, Result};
use iterflow_cli::DatasetArgs;
use iterflow_io::load_scenario;

/// Returns whether the dataset is free of errors.
pub fn handle(dataset: &DatasetArgs, slot_minutes: f64, json: bool) -> Result<bool> {
    let import = load_scenario(&dataset.paths(), slot_minutes)?;
    let scenario = &import.scenario;
    if json {
        let rendered = serde_json::to_string_pretty(&import.diagnostics)
            .context("serializing diagnostics to JSON")?;
        println!("{rendered}");
    } else {
        println!("{}", scenario.network.stats());
        println!(
            "Trips: {} ({} paths, demand {:.1})",
            scenario.trips.len(),
            scenario.path_count(),
            scenario.total_demand()
        );
        print!("{}", import.diagnostics);
    }
    Ok(!import.diagnostics.has_errors())
}
