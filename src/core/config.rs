//! Ledger configuration loaded from `.epiledger/config.toml`.
//!
//! Absence of a config file is not an error: every field has a default.
//! Per-agent overrides are resolved into plain values and passed into the
//! drift and calibration engines; nothing here is global state.

use crate::core::error::LedgerError;
use crate::core::store::Store;
use crate::plugins::checkpoint::CANONICAL_VECTORS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const MIN_DRIFT_WINDOW: usize = 5;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    pub drift: DriftConfig,
    pub calibration: CalibrationConfig,
    pub archive: ArchiveConfig,
    pub trail: TrailConfig,
    pub agents: BTreeMap<String, AgentOverrides>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DriftConfig {
    pub window: usize,
    pub bias_indicators: Vec<String>,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window: MIN_DRIFT_WINDOW,
            bias_indicators: ["know", "uncertainty", "context", "clarity", "completion"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CalibrationConfig {
    pub tolerance: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { tolerance: 0.15 }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    #[default]
    Git,
    Sequence,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ArchiveConfig {
    pub anchor: AnchorKind,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TrailConfig {
    pub enabled: bool,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AgentOverrides {
    pub tolerance: Option<f64>,
    pub window: Option<usize>,
}

impl LedgerConfig {
    pub fn parse(content: &str) -> Result<Self, LedgerError> {
        let config: LedgerConfig =
            toml::from_str(content).map_err(|e| LedgerError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        check_window(self.drift.window)?;
        check_tolerance(self.calibration.tolerance)?;
        if self.drift.bias_indicators.is_empty() {
            return Err(LedgerError::ConfigError(
                "drift.bias_indicators must not be empty".into(),
            ));
        }
        for name in &self.drift.bias_indicators {
            if !CANONICAL_VECTORS.contains(&name.as_str()) {
                return Err(LedgerError::ConfigError(format!(
                    "drift.bias_indicators: unknown vector '{}'",
                    name
                )));
            }
        }
        for (agent, o) in &self.agents {
            if let Some(w) = o.window {
                check_window(w).map_err(|e| LedgerError::ConfigError(format!("agents.{}: {}", agent, e)))?;
            }
            if let Some(t) = o.tolerance {
                check_tolerance(t).map_err(|e| LedgerError::ConfigError(format!("agents.{}: {}", agent, e)))?;
            }
        }
        Ok(())
    }

    pub fn drift_window_for(&self, agent_id: &str) -> usize {
        self.agents
            .get(agent_id)
            .and_then(|o| o.window)
            .unwrap_or(self.drift.window)
    }

    pub fn tolerance_for(&self, agent_id: &str) -> f64 {
        self.agents
            .get(agent_id)
            .and_then(|o| o.tolerance)
            .unwrap_or(self.calibration.tolerance)
    }
}

fn check_window(window: usize) -> Result<(), LedgerError> {
    if window < MIN_DRIFT_WINDOW {
        return Err(LedgerError::ConfigError(format!(
            "drift window must be >= {}, got {}",
            MIN_DRIFT_WINDOW, window
        )));
    }
    Ok(())
}

fn check_tolerance(tolerance: f64) -> Result<(), LedgerError> {
    if !(0.0..=1.0).contains(&tolerance) {
        return Err(LedgerError::ConfigError(format!(
            "calibration tolerance must be in [0, 1], got {}",
            tolerance
        )));
    }
    Ok(())
}

/// Load config from `<project>/.epiledger/config.toml`, falling back to
/// `config.toml` beside the store root (`$EPILEDGER_HOME/../config.toml`).
/// Nothing outside those two paths is consulted.
pub fn load_config(project_root: &Path, store: &Store) -> Result<LedgerConfig, LedgerError> {
    let candidates = [
        Some(project_root.join(".epiledger").join("config.toml")),
        store.root.parent().map(|p| p.join("config.toml")),
    ];
    for path in candidates.into_iter().flatten() {
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            return LedgerConfig::parse(&content);
        }
    }
    Ok(LedgerConfig::default())
}
