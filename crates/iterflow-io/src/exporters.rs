//! Result export and re-import.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use iterflow_algo::options::{Cell, OptionKey, OptionSet};
use iterflow_algo::{
    AssignmentOutcome, AssignmentRecord, CellFlows, ConvergenceRecord, IterationSummary,
    LinkStatistics, OverallStatistics, TerminalState,
};
use iterflow_core::TripId;
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

pub const ASSIGNMENTS_FILE: &str = "assignments.csv";
pub const LINK_STATISTICS_FILE: &str = "link_statistics.csv";
pub const CONVERGENCE_FILE: &str = "convergence.csv";
pub const FLOWS_BY_TIME_FILE: &str = "flows_by_time.json";
pub const SUMMARY_FILE: &str = "summary.json";

/// Contents of `summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub terminal: TerminalState,
    pub oracle: &'a str,
    pub failure: Option<String>,
    pub final_iteration: Option<usize>,
    pub overall: Option<&'a OverallStatistics>,
    pub iterations: &'a [IterationSummary],
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating CSV writer for {}", path.display()))?;
    for row in rows {
        wtr.serialize(row).context("writing CSV record")?;
    }
    wtr.flush().context("flushing CSV writer")?;
    Ok(())
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("opening CSV: {}", path.display()))?;
    rdr.deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("reading records from {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing to JSON")?;
    fs::write(path, json).with_context(|| format!("writing JSON to {}", path.display()))
}

pub fn write_assignments(path: &Path, records: &[AssignmentRecord]) -> Result<()> {
    write_csv(path, records)
}

pub fn read_assignments(path: &Path) -> Result<Vec<AssignmentRecord>> {
    read_csv(path)
}

pub fn write_link_statistics(path: &Path, stats: &[LinkStatistics]) -> Result<()> {
    write_csv(path, stats)
}

pub fn write_convergence(path: &Path, trace: &[ConvergenceRecord]) -> Result<()> {
    write_csv(path, trace)
}

pub fn read_convergence(path: &Path) -> Result<Vec<ConvergenceRecord>> {
    read_csv(path)
}

/// Write cell flows as `{"from,to": {"slot": vehicles}}`.
pub fn write_flows_by_time(path: &Path, flows: &CellFlows) -> Result<()> {
    let shaped: BTreeMap<String, BTreeMap<usize, f64>> = flows
        .iter()
        .map(|(key, series)| {
            (
                format!("{},{}", key.from, key.to),
                series.iter().copied().enumerate().collect(),
            )
        })
        .collect();
    write_json(path, &shaped)
}

/// Write every output file of a run into `dir`, creating it if needed.
///
/// Per-iterate files are only written when the run produced a usable
/// iterate. Returns the paths written.
pub fn write_outputs(dir: &Path, outcome: &AssignmentOutcome, oracle: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating output directory {}", dir.display()))?;
    let mut written = Vec::new();

    if let Some(iterate) = &outcome.final_iterate {
        let path = dir.join(ASSIGNMENTS_FILE);
        write_assignments(&path, &iterate.records)?;
        written.push(path);

        let path = dir.join(LINK_STATISTICS_FILE);
        write_link_statistics(&path, &iterate.link_statistics)?;
        written.push(path);

        let path = dir.join(FLOWS_BY_TIME_FILE);
        write_flows_by_time(&path, &iterate.cell_flows)?;
        written.push(path);
    }

    let path = dir.join(CONVERGENCE_FILE);
    write_convergence(&path, &outcome.trace)?;
    written.push(path);

    let summary = RunSummary {
        terminal: outcome.terminal,
        oracle,
        failure: outcome.failure.as_ref().map(ToString::to_string),
        final_iteration: outcome.final_iterate.as_ref().map(|i| i.iteration),
        overall: outcome.final_iterate.as_ref().map(|i| &i.overall),
        iterations: &outcome.iterations,
    };
    let path = dir.join(SUMMARY_FILE);
    write_json(&path, &summary)?;
    written.push(path);

    info!(files = written.len(), dir = %dir.display(), "results written");
    Ok(written)
}

/// Vehicles assigned per trip.
pub fn demand_totals(records: &[AssignmentRecord]) -> BTreeMap<TripId, f64> {
    let mut totals = BTreeMap::new();
    for r in records {
        *totals.entry(r.trip).or_insert(0.0) += r.vehicles_assigned;
    }
    totals
}

/// Assigned vehicles per cell, re-derived from records and the option cells
/// they were solved with. Records without a matching option are skipped.
pub fn cell_flow_totals(records: &[AssignmentRecord], options: &OptionSet) -> BTreeMap<Cell, f64> {
    let mut totals = BTreeMap::new();
    for r in records {
        let key = OptionKey {
            trip: r.trip,
            path: r.path,
            departure_slot: r.departure_slot,
        };
        let Some(option) = options.position(&key).map(|i| &options.options[i]) else {
            continue;
        };
        for cell in &option.cells {
            *totals.entry(*cell).or_insert(0.0) += r.vehicles_assigned;
        }
    }
    totals
}
