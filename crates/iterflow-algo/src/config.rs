//! Run configuration for the assignment engine.
//!
//! Values come from three layers, later layers winning:
//! built-in defaults, a TOML file (deserialized by the caller), and
//! environment variables (see [`AssignmentConfig::apply_env_overrides`]).

use iterflow_core::BprLaw;
use serde::{Deserialize, Serialize};

use crate::error::AssignmentError;

/// How the estimator averages a link's cell flows over the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowAveraging {
    /// Mean over every slot, including empty ones.
    #[default]
    All,
    /// Mean over slots carrying positive flow only.
    Positive,
}

impl std::str::FromStr for FlowAveraging {
    type Err = AssignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FlowAveraging::All),
            "positive" | "nonzero" => Ok(FlowAveraging::Positive),
            other => Err(AssignmentError::Config(format!(
                "unknown flow averaging mode '{other}' (expected all|positive)"
            ))),
        }
    }
}

/// Optimization oracle selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Backend name, see [`crate::oracle::OracleBackend::available`]
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Wall-clock limit per solve in seconds (0 = no limit)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub verbose: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            timeout_seconds: default_timeout(),
            verbose: false,
        }
    }
}

fn default_backend() -> String {
    "clarabel".to_string()
}

fn default_timeout() -> u64 {
    300
}

/// Parameters of the iterative assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// Target travel-time index cap used to derive the utilization ceiling
    #[serde(default = "default_tti_cap")]
    pub tti_cap: f64,
    /// Multiplier widening the utilization ceiling
    #[serde(default = "default_headroom")]
    pub utilization_headroom: f64,
    /// Paths slower than `(1 + gamma)` times the trip's fastest path are dropped
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: f64,
    #[serde(default = "default_horizon_slots")]
    pub horizon_slots: usize,
    /// First slot of the second day
    #[serde(default = "default_day_boundary")]
    pub day_boundary_slot: usize,
    #[serde(default = "default_background_scale")]
    pub background_scale: f64,
    /// Background flow is clipped to `u_max·mu − background_margin`
    #[serde(default = "default_background_margin")]
    pub background_margin: f64,
    #[serde(default = "default_pwl_segments")]
    pub pwl_segments: usize,
    /// Force segments to fill in order
    #[serde(default)]
    pub pwl_prefix: bool,
    #[serde(default = "default_demand_penalty")]
    pub demand_penalty: f64,
    #[serde(default = "default_capacity_penalty")]
    pub capacity_penalty: f64,
    /// Allow penalized flow above the utilization ceiling
    #[serde(default = "default_true")]
    pub relax_capacity: bool,
    /// Magnitude the scaled objective is normalized towards
    #[serde(default = "default_objective_target")]
    pub objective_target: f64,
    #[serde(default = "default_inconvenience_floor")]
    pub inconvenience_floor: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Relative TSTT change below which the run is converged
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
    #[serde(default)]
    pub flow_averaging: FlowAveraging,
    #[serde(default)]
    pub congestion: BprLaw,
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            tti_cap: default_tti_cap(),
            utilization_headroom: default_headroom(),
            gamma: default_gamma(),
            slot_minutes: default_slot_minutes(),
            horizon_slots: default_horizon_slots(),
            day_boundary_slot: default_day_boundary(),
            background_scale: default_background_scale(),
            background_margin: default_background_margin(),
            pwl_segments: default_pwl_segments(),
            pwl_prefix: false,
            demand_penalty: default_demand_penalty(),
            capacity_penalty: default_capacity_penalty(),
            relax_capacity: true,
            objective_target: default_objective_target(),
            inconvenience_floor: default_inconvenience_floor(),
            max_iterations: default_max_iterations(),
            convergence_threshold: default_convergence_threshold(),
            flow_averaging: FlowAveraging::All,
            congestion: BprLaw::default(),
            oracle: OracleConfig::default(),
        }
    }
}

fn default_tti_cap() -> f64 {
    4.0
}

fn default_headroom() -> f64 {
    1.10
}

fn default_gamma() -> f64 {
    0.25
}

fn default_slot_minutes() -> f64 {
    15.0
}

fn default_horizon_slots() -> usize {
    108
}

fn default_day_boundary() -> usize {
    52
}

fn default_background_scale() -> f64 {
    0.6
}

fn default_background_margin() -> f64 {
    2.0
}

fn default_pwl_segments() -> usize {
    10
}

fn default_demand_penalty() -> f64 {
    1e5
}

fn default_capacity_penalty() -> f64 {
    1e3
}

fn default_true() -> bool {
    true
}

fn default_objective_target() -> f64 {
    1e6
}

fn default_inconvenience_floor() -> f64 {
    0.99
}

fn default_max_iterations() -> usize {
    3
}

fn default_convergence_threshold() -> f64 {
    0.05
}

impl AssignmentConfig {
    /// Utilization ceiling `u_max` implied by the TTI cap and headroom.
    pub fn utilization_ceiling(&self) -> f64 {
        self.congestion
            .utilization_ceiling(self.tti_cap, self.utilization_headroom)
    }

    /// Builder-style overrides, mostly for tests and embedding.
    pub fn with_horizon_slots(mut self, slots: usize) -> Self {
        self.horizon_slots = slots;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_flow_averaging(mut self, mode: FlowAveraging) -> Self {
        self.flow_averaging = mode;
        self
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<(), AssignmentError> {
        self.apply_env_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup` using the documented variable names
    /// (`U_TTI`, `GAMMA`, `DELTA_MIN`, ...).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), AssignmentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("U_TTI") {
            self.tti_cap = parse_var("U_TTI", &v)?;
        }
        if let Some(v) = lookup("GAMMA") {
            self.gamma = parse_var("GAMMA", &v)?;
        }
        if let Some(v) = lookup("DELTA_MIN") {
            self.slot_minutes = parse_var("DELTA_MIN", &v)?;
        }
        if let Some(v) = lookup("TIME_SLOTS") {
            self.horizon_slots = parse_var("TIME_SLOTS", &v)?;
        }
        if let Some(v) = lookup("DAY_BOUNDARY") {
            self.day_boundary_slot = parse_var("DAY_BOUNDARY", &v)?;
        }
        if let Some(v) = lookup("Z_SCALE") {
            self.background_scale = parse_var("Z_SCALE", &v)?;
        }
        if let Some(v) = lookup("PWL_SEGMENTS") {
            self.pwl_segments = parse_var("PWL_SEGMENTS", &v)?;
        }
        if let Some(v) = lookup("PWL_PREFIX") {
            self.pwl_prefix = parse_flag(&v);
        }
        if let Some(v) = lookup("PEN_DEM") {
            self.demand_penalty = parse_var("PEN_DEM", &v)?;
        }
        if let Some(v) = lookup("PEN_TTI") {
            self.capacity_penalty = parse_var("PEN_TTI", &v)?;
        }
        if let Some(v) = lookup("RELAX_TTI") {
            self.relax_capacity = parse_flag(&v);
        }
        if let Some(v) = lookup("MAX_ITERATIONS") {
            self.max_iterations = parse_var("MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("CONV_THRESHOLD") {
            self.convergence_threshold = parse_var("CONV_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("FLOW_AVERAGING") {
            self.flow_averaging = v.parse()?;
        }
        if let Some(v) = lookup("LP_SOLVER") {
            self.oracle.backend = v.trim().to_ascii_lowercase();
        }
        if let Some(v) = lookup("SOLVER_TIMEOUT") {
            self.oracle.timeout_seconds = parse_var("SOLVER_TIMEOUT", &v)?;
        }
        Ok(())
    }

    /// Reject values the model cannot be built with.
    pub fn validate(&self) -> Result<(), AssignmentError> {
        if !(self.slot_minutes > 0.0) {
            return Err(AssignmentError::Config(format!(
                "slot_minutes must be positive, got {}",
                self.slot_minutes
            )));
        }
        if self.horizon_slots == 0 {
            return Err(AssignmentError::Config("horizon_slots must be positive".into()));
        }
        if self.pwl_segments == 0 {
            return Err(AssignmentError::Config("pwl_segments must be positive".into()));
        }
        if !(self.tti_cap > 1.0) {
            return Err(AssignmentError::Config(format!(
                "tti_cap must exceed 1.0, got {}",
                self.tti_cap
            )));
        }
        if !(self.utilization_headroom > 0.0) {
            return Err(AssignmentError::Config(
                "utilization_headroom must be positive".into(),
            ));
        }
        if !(self.gamma >= 0.0) {
            return Err(AssignmentError::Config(format!(
                "gamma must be non-negative, got {}",
                self.gamma
            )));
        }
        if !(self.background_scale >= 0.0) {
            return Err(AssignmentError::Config(
                "background_scale must be non-negative".into(),
            ));
        }
        if !(self.demand_penalty >= 0.0) || !(self.capacity_penalty >= 0.0) {
            return Err(AssignmentError::Config("penalties must be non-negative".into()));
        }
        if !(self.objective_target > 0.0) {
            return Err(AssignmentError::Config(
                "objective_target must be positive".into(),
            ));
        }
        if !(self.inconvenience_floor > 0.0 && self.inconvenience_floor <= 1.0) {
            return Err(AssignmentError::Config(format!(
                "inconvenience_floor must lie in (0, 1], got {}",
                self.inconvenience_floor
            )));
        }
        if self.max_iterations == 0 {
            return Err(AssignmentError::Config("max_iterations must be positive".into()));
        }
        if !(self.convergence_threshold > 0.0) {
            return Err(AssignmentError::Config(
                "convergence_threshold must be positive".into(),
            ));
        }
        if !(self.congestion.alpha > 0.0) || !(self.congestion.beta >= 1.0) {
            return Err(AssignmentError::Config(
                "congestion law needs alpha > 0 and beta >= 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AssignmentError> {
    value
        .trim()
        .parse()
        .map_err(|_| AssignmentError::Config(format!("{name}: cannot parse '{value}'")))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AssignmentConfig::default();
        assert_eq!(cfg.horizon_slots, 108);
        assert_eq!(cfg.pwl_segments, 10);
        assert_eq!(cfg.max_iterations, 3);
        assert!(cfg.relax_capacity);
        assert!(!cfg.pwl_prefix);
        assert_eq!(cfg.oracle.backend, "clarabel");
        // ((4 - 1) / 0.15)^(1/4) * 1.1
        let expected = 20f64.powf(0.25) * 1.1;
        assert!((cfg.utilization_ceiling() - expected).abs() < 1e-12);
        cfg.validate().unwrap();
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("GAMMA", "0.5"),
            ("TIME_SLOTS", "24"),
            ("RELAX_TTI", "0"),
            ("PWL_PREFIX", "1"),
            ("FLOW_AVERAGING", "positive"),
            ("LP_SOLVER", "GoodLp"),
        ]
        .into_iter()
        .collect();
        let mut cfg = AssignmentConfig::default();
        cfg.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.gamma, 0.5);
        assert_eq!(cfg.horizon_slots, 24);
        assert!(!cfg.relax_capacity);
        assert!(cfg.pwl_prefix);
        assert_eq!(cfg.flow_averaging, FlowAveraging::Positive);
        assert_eq!(cfg.oracle.backend, "goodlp");
    }

    #[test]
    fn bad_env_value_is_config_error() {
        let mut cfg = AssignmentConfig::default();
        let err = cfg
            .apply_env_overrides(|k| (k == "GAMMA").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, AssignmentError::Config(_)));
    }

    #[test]
    fn toml_partial_file_keeps_defaults() {
        let cfg: AssignmentConfig = toml::from_str(
            r#"
            gamma = 0.1
            horizon_slots = 12

            [oracle]
            timeout_seconds = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.gamma, 0.1);
        assert_eq!(cfg.horizon_slots, 12);
        assert_eq!(cfg.oracle.timeout_seconds, 30);
        assert_eq!(cfg.oracle.backend, "clarabel");
        assert_eq!(cfg.day_boundary_slot, 52);
        assert_eq!(cfg.congestion, BprLaw::default());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = AssignmentConfig::default();
        cfg.tti_cap = 1.0;
        assert!(cfg.validate().is_err());

        let cfg = AssignmentConfig::default().with_gamma(-0.1);
        assert!(cfg.validate().is_err());

        let cfg = AssignmentConfig::default().with_horizon_slots(0);
        assert!(cfg.validate().is_err());

        for floor in [f64::NAN, -0.5, 0.0, 1.5] {
            let mut cfg = AssignmentConfig::default();
            cfg.inconvenience_floor = floor;
            let err = cfg.validate().unwrap_err();
            assert!(err.to_string().contains("inconvenience_floor"), "{floor}");
        }
        let mut cfg = AssignmentConfig::default();
        cfg.inconvenience_floor = 1.0;
        cfg.validate().unwrap();
    }
}
