//! Strategy configuration files.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::strategy::Setting;

/// One strategy instance as configured by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Unique instance name
    pub strategy_name: String,

    /// Strategy class to instantiate
    pub class_name: String,

    /// Instrument the instance trades
    pub vt_symbol: String,

    /// Parameter overrides; unknown keys are ignored
    #[serde(default)]
    pub setting: Setting,
}

/// Parse a JSON array of strategy configs.
pub fn parse_strategy_configs(json: &str) -> Result<Vec<StrategyConfig>> {
    serde_json::from_str(json).context("Invalid strategy config JSON")
}

/// Read a JSON array of strategy configs from `path`.
pub fn load_strategy_configs(path: impl AsRef<Path>) -> Result<Vec<StrategyConfig>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_strategy_configs(&json).with_context(|| format!("Failed to parse {}", path.display()))
}
