use std::path::Path;

use anyhow::{Context, Result};
use iterflow_algo::AssignmentConfig;
use tracing::debug;

/// Defaults, then the TOML file, then environment variables.
pub fn load_config(path: Option<&Path>) -> Result<AssignmentConfig> {
    let mut config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("parsing config: {}", path.display()))?
        }
        None => AssignmentConfig::default(),
    };
    config.apply_env().context("applying environment overrides")?;
    config.validate().context("invalid configuration")?;
    debug!(?config, "configuration loaded");
    Ok(config)
}

pub fn handle(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let rendered = toml::to_string_pretty(&config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
