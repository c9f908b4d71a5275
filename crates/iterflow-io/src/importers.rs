//! Dataset importers.
//!
//! | File | Shape |
//! |------|-------|
//! | `links.csv` | `from,to,capacity,fftt[,name]`, capacity in vehicles per hour |
//! | `nodes.csv` | `id[,name,x,y]` (optional) |
//! | `trips.csv` | `trip_id,demand,path_0,tempo_0,possible_departure_times_0,preferenza_0,path_1,...` |
//! | background JSON | `{"from,to": {"slot": vehicles}}` |
//! | scenario JSON | serde form of [`Scenario`] |
//!
//! Row-level problems are collected in [`Diagnostics`] and the row is
//! skipped. Missing files, missing required columns and malformed link rows
//! are errors.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use csv::StringRecord;
use iterflow_core::{
    BackgroundTraffic, DeparturePreference, Diagnostics, Link, LinkKey, Network, Node, PathChoice,
    PathId, Scenario, Trip, TripId,
};
use tracing::{debug, info};

use crate::fields::{parse_node_id, parse_number, parse_optional_number, parse_path, parse_slots};

/// Locations of one dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetPaths {
    pub links: PathBuf,
    pub trips: PathBuf,
    pub nodes: Option<PathBuf>,
    pub background: Option<PathBuf>,
}

/// A scenario plus the data-quality findings of its import.
#[derive(Debug, Clone)]
pub struct ScenarioImport {
    pub scenario: Scenario,
    pub diagnostics: Diagnostics,
}

/// Header name to column position, case-insensitive.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
            .collect();
        Self { index }
    }

    fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|a| self.index.get(*a).copied())
    }

    fn require(&self, aliases: &[&str], file: &Path) -> Result<usize> {
        self.find(aliases).ok_or_else(|| {
            anyhow!(
                "{}: missing required column '{}'",
                file.display(),
                aliases[0]
            )
        })
    }
}

fn reader(path: &Path) -> Result<csv::Reader<fs::File>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening CSV: {}", path.display()))
}

fn line_of(record: &StringRecord) -> usize {
    record.position().map_or(0, |p| p.line() as usize)
}

fn cell<'a>(record: &'a StringRecord, column: Option<usize>) -> &'a str {
    column.and_then(|c| record.get(c)).unwrap_or("")
}

/// Read `nodes.csv` into `network`.
pub fn read_nodes(path: &Path, network: &mut Network, diag: &mut Diagnostics) -> Result<usize> {
    let mut rdr = reader(path)?;
    let cols = Columns::new(rdr.headers().context("reading nodes header")?);
    let id_col = cols.require(&["id", "node_id"], path)?;
    let name_col = cols.find(&["name"]);
    let x_col = cols.find(&["x", "lon"]);
    let y_col = cols.find(&["y", "lat"]);

    let mut count = 0;
    for record in rdr.records() {
        let record = record.context("reading nodes CSV record")?;
        let line = line_of(&record);
        let id = match parse_node_id(cell(&record, Some(id_col))) {
            Ok(id) => id,
            Err(e) => {
                diag.add_warning_at_line("parse", &e.to_string(), line);
                continue;
            }
        };
        let mut node = Node::new(id, cell(&record, name_col));
        if let (Some(x), Some(y)) = (
            parse_optional_number(cell(&record, x_col)),
            parse_optional_number(cell(&record, y_col)),
        ) {
            node = node.with_coordinates(x, y);
        }
        network.add_node(node);
        count += 1;
    }
    debug!(nodes = count, path = %path.display(), "read nodes");
    Ok(count)
}

/// Read `links.csv` into `network`, converting hourly capacity to vehicles
/// per slot of `slot_minutes`.
///
/// Endpoints missing from the node table are created unnamed.
pub fn read_links(
    path: &Path,
    network: &mut Network,
    slot_minutes: f64,
    diag: &mut Diagnostics,
) -> Result<usize> {
    let mut rdr = reader(path)?;
    let cols = Columns::new(rdr.headers().context("reading links header")?);
    let from_col = cols.require(&["from", "from_node"], path)?;
    let to_col = cols.require(&["to", "to_node"], path)?;
    let cap_col = cols.require(&["capacity"], path)?;
    let ff_col = cols.require(&["fftt", "free_flow_time"], path)?;
    let name_col = cols.find(&["name"]);
    let per_slot = slot_minutes / 60.0;

    let mut count = 0;
    for record in rdr.records() {
        let record = record.context("reading links CSV record")?;
        let line = line_of(&record);
        let parse = || -> Result<Link> {
            let from = parse_node_id(cell(&record, Some(from_col)))?;
            let to = parse_node_id(cell(&record, Some(to_col)))?;
            let capacity = parse_number(cell(&record, Some(cap_col)))?;
            let fftt = parse_number(cell(&record, Some(ff_col)))?;
            Ok(Link::new(from, to, fftt, capacity * per_slot))
        };
        let mut link = parse().with_context(|| format!("{}:{line}", path.display()))?;
        if let Some(name) = name_col.map(|c| cell(&record, Some(c))).filter(|n| !n.is_empty()) {
            link = link.with_name(name);
        }

        network.ensure_node(link.from);
        network.ensure_node(link.to);
        let key = link.key();
        if let Err(e) = network.add_link(link) {
            diag.add_warning_with_entity("network", &e.to_string(), &key.to_string());
            continue;
        }
        count += 1;
    }
    debug!(links = count, path = %path.display(), "read links");
    Ok(count)
}

/// Read the wide `trips.csv` table.
///
/// Path columns are scanned from `path_0` upward and stop at the first blank
/// path or travel-time cell. A path's id is its column index. Trips left
/// without any parseable path are dropped with a warning.
pub fn read_trips(path: &Path, diag: &mut Diagnostics) -> Result<Vec<Trip>> {
    let mut rdr = reader(path)?;
    let cols = Columns::new(rdr.headers().context("reading trips header")?);
    let id_col = cols.require(&["trip_id"], path)?;
    let demand_col = cols.require(&["demand"], path)?;

    let mut trips = Vec::new();
    for record in rdr.records() {
        let record = record.context("reading trips CSV record")?;
        let line = line_of(&record);
        let id = match cell(&record, Some(id_col)).parse::<usize>() {
            Ok(id) => TripId::new(id),
            Err(_) => {
                diag.add_warning_at_line(
                    "parse",
                    &format!("invalid trip_id '{}'", cell(&record, Some(id_col))),
                    line,
                );
                continue;
            }
        };
        let demand = match parse_number(cell(&record, Some(demand_col))) {
            Ok(d) => d,
            Err(e) => {
                diag.add_warning_at_line("parse", &e.to_string(), line);
                continue;
            }
        };

        let mut trip = Trip::new(id, demand);
        for k in 0.. {
            let Some(path_col) = cols.find(&[format!("path_{k}").as_str()]) else {
                break;
            };
            let raw_path = cell(&record, Some(path_col));
            let tempo = cols
                .find(&[format!("tempo_{k}").as_str()])
                .map(|c| cell(&record, Some(c)))
                .unwrap_or("");
            if raw_path.is_empty() || tempo.is_empty() {
                break;
            }

            let links = match parse_path(raw_path) {
                Ok(links) if !links.is_empty() => links,
                Ok(_) => continue,
                Err(e) => {
                    diag.add_warning_with_entity("parse", &e.to_string(), &format!("trip {id} path {k}"));
                    continue;
                }
            };
            let slots = cols
                .find(&[format!("possible_departure_times_{k}").as_str()])
                .map(|c| parse_slots(cell(&record, Some(c))))
                .unwrap_or_default();
            let tag = cols
                .find(&[format!("preferenza_{k}").as_str(), format!("preference_{k}").as_str()])
                .map(|c| cell(&record, Some(c)))
                .unwrap_or("");
            let preference = DeparturePreference::from_tag(tag).unwrap_or_else(|| {
                diag.add_warning_with_entity(
                    "parse",
                    &format!("unknown departure preference '{tag}', using either"),
                    &format!("trip {id} path {k}"),
                );
                DeparturePreference::Either
            });

            let mut choice = PathChoice::new(PathId::new(k), links)
                .with_preference(preference)
                .with_departure_slots(slots);
            if let Some(minutes) = parse_optional_number(tempo) {
                choice = choice.with_baseline_minutes(minutes);
            }
            trip = trip.with_path(choice);
        }

        if trip.paths.is_empty() {
            diag.add_warning_at_line(
                "demand",
                &format!("trip {id} has no parseable path and is dropped"),
                line,
            );
            continue;
        }
        trips.push(trip);
    }
    debug!(trips = trips.len(), path = %path.display(), "read trips");
    Ok(trips)
}

/// Read background traffic in the `{"from,to": {"slot": vehicles}}` shape.
///
/// Malformed link or slot keys are reported and skipped.
pub fn read_background(path: &Path, diag: &mut Diagnostics) -> Result<BackgroundTraffic> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading background traffic: {}", path.display()))?;
    let raw: BTreeMap<String, BTreeMap<String, f64>> = serde_json::from_str(&text)
        .with_context(|| format!("parsing background traffic JSON: {}", path.display()))?;

    let mut background = BackgroundTraffic::new();
    for (link, slots) in raw {
        let Some(key) = parse_link_key(&link) else {
            diag.add_warning_with_entity("parse", "malformed background link key", &link);
            continue;
        };
        for (slot, value) in slots {
            match slot.trim().parse::<usize>() {
                Ok(t) => background.set(key, t, value),
                Err(_) => diag.add_warning_with_entity(
                    "parse",
                    &format!("malformed background slot '{slot}'"),
                    &link,
                ),
            }
        }
    }
    debug!(links = background.link_count(), total = background.total(), "read background traffic");
    Ok(background)
}

/// `"from,to"` as used by the JSON files.
pub fn parse_link_key(raw: &str) -> Option<LinkKey> {
    let (from, to) = raw.split_once(',')?;
    Some(LinkKey::new(
        parse_node_id(from).ok()?,
        parse_node_id(to).ok()?,
    ))
}

/// Load a full dataset and validate it.
pub fn load_scenario(paths: &DatasetPaths, slot_minutes: f64) -> Result<ScenarioImport> {
    let mut diagnostics = Diagnostics::new();
    let mut network = Network::new();
    if let Some(nodes) = &paths.nodes {
        read_nodes(nodes, &mut network, &mut diagnostics)?;
    }
    read_links(&paths.links, &mut network, slot_minutes, &mut diagnostics)?;
    let trips = read_trips(&paths.trips, &mut diagnostics)?;
    let background = match &paths.background {
        Some(path) => read_background(path, &mut diagnostics)?,
        None => BackgroundTraffic::new(),
    };

    let scenario = Scenario::new(network, trips).with_background(background);
    scenario.validate_into(&mut diagnostics);
    info!(
        nodes = scenario.network.node_count(),
        links = scenario.network.link_count(),
        trips = scenario.trips.len(),
        demand = scenario.total_demand(),
        warnings = diagnostics.warning_count(),
        errors = diagnostics.error_count(),
        "dataset loaded"
    );
    Ok(ScenarioImport {
        scenario,
        diagnostics,
    })
}

pub fn read_scenario_json(path: &Path) -> Result<Scenario> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading scenario: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing scenario JSON: {}", path.display()))
}

pub fn write_scenario_json(scenario: &Scenario, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(scenario).context("serializing scenario to JSON")?;
    fs::write(path, json).with_context(|| format!("writing JSON to {}", path.display()))
}
