//! Trips, candidate paths and departure preferences.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{IterflowError, LinkKey, PathId, TripId};

/// Day window a path's departures must fall into.
///
/// Scenario horizons typically span two days; `boundary` is the
/// first slot of the second day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeparturePreference {
    #[default]
    Either,
    FirstDay,
    SecondDay,
}

impl DeparturePreference {
    /// Whether a departure at `slot` respects this preference.
    #[inline]
    pub fn admits(&self, slot: usize, boundary: usize) -> bool {
        match self {
            DeparturePreference::Either => true,
            DeparturePreference::FirstDay => slot < boundary,
            DeparturePreference::SecondDay => slot >= boundary,
        }
    }

    /// Parse a dataset tag. Returns `None` for unrecognized tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "entrambi" | "both" | "either" => Some(DeparturePreference::Either),
            "giorno1" | "day1" | "first_day" => Some(DeparturePreference::FirstDay),
            "giorno2" | "day2" | "second_day" => Some(DeparturePreference::SecondDay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeparturePreference::Either => "either",
            DeparturePreference::FirstDay => "day1",
            DeparturePreference::SecondDay => "day2",
        }
    }
}

impl FromStr for DeparturePreference {
    type Err = IterflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
            .ok_or_else(|| IterflowError::Parse(format!("unknown departure preference '{s}'")))
    }
}

impl std::fmt::Display for DeparturePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate route of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathChoice {
    pub id: PathId,
    pub links: Vec<LinkKey>,
    /// Tabulated travel time from the dataset; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_minutes: Option<f64>,
    #[serde(default)]
    pub preference: DeparturePreference,
    /// Admissible departure slots, sorted and de-duplicated.
    #[serde(default, deserialize_with = "sorted_slots")]
    pub departure_slots: Vec<usize>,
}

fn normalize_slots(mut slots: Vec<usize>) -> Vec<usize> {
    slots.sort_unstable();
    slots.dedup();
    slots
}

fn sorted_slots<'de, D>(deserializer: D) -> Result<Vec<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<usize>::deserialize(deserializer).map(normalize_slots)
}

impl PathChoice {
    pub fn new(id: PathId, links: Vec<LinkKey>) -> Self {
        Self {
            id,
            links,
            baseline_minutes: None,
            preference: DeparturePreference::Either,
            departure_slots: Vec::new(),
        }
    }

    pub fn with_baseline_minutes(mut self, minutes: f64) -> Self {
        self.baseline_minutes = Some(minutes);
        self
    }

    pub fn with_preference(mut self, preference: DeparturePreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_departure_slots(mut self, slots: impl IntoIterator<Item = usize>) -> Self {
        self.departure_slots = normalize_slots(slots.into_iter().collect());
        self
    }

    /// Departure slots that respect the path's preference window.
    pub fn admissible_slots(&self, boundary: usize) -> impl Iterator<Item = usize> + '_ {
        let preference = self.preference;
        self.departure_slots
            .iter()
            .copied()
            .filter(move |&slot| preference.admits(slot, boundary))
    }
}

/// A travel demand between an origin and a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    /// Vehicles to assign; may be fractional.
    pub demand: f64,
    #[serde(default)]
    pub paths: Vec<PathChoice>,
}

impl Trip {
    pub fn new(id: TripId, demand: f64) -> Self {
        Self {
            id,
            demand,
            paths: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: PathChoice) -> Self {
        self.paths.push(path);
        self
    }

    pub fn path(&self, id: PathId) -> Option<&PathChoice> {
        self.paths.iter().find(|p| p.id == id)
    }
}
