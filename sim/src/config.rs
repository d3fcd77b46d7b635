//! Simulation configuration.
//!
//! Loaded from JSON; every field has a default so partial documents work.

use crate::battlefield::BattlefieldConfig;
use crate::cells::CellGridConfig;
use crate::error::ConfigError;
use crate::ode::SolverParams;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f64,
    /// Longest interval handed to a vehicle's solver in one call.
    pub max_substep: f64,
    pub solver: SolverParams,
    pub battlefield: BattlefieldConfig,
    pub cells: CellGridConfig,
    /// Time allowed per tick for advancing active cells, milliseconds.
    pub active_cell_budget_ms: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0,
            max_substep: 0.02,
            solver: SolverParams::default(),
            battlefield: BattlefieldConfig::default(),
            cells: CellGridConfig::default(),
            active_cell_budget_ms: 10.0,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_timestep > 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "fixed_timestep must be positive (got {})",
                self.fixed_timestep
            )));
        }
        if !(self.max_substep > 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "max_substep must be positive (got {})",
                self.max_substep
            )));
        }
        if !(self.active_cell_budget_ms >= 0.0) {
            return Err(ConfigError::InvalidParameter(
                "active_cell_budget_ms must be non-negative".to_string(),
            ));
        }
        self.solver.validate()?;
        self.battlefield.validate()?;
        self.cells.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_document() {
        let config = SimConfig::from_json_str(
            r#"{ "fixed_timestep": 0.02, "battlefield": { "air_bubble": 25000.0 }, "cells": { "vis_range": 4 } }"#,
        )
        .unwrap();
        assert_eq!(config.fixed_timestep, 0.02);
        assert_eq!(config.battlefield.air_bubble, 25000.0);
        assert_eq!(config.battlefield.ground_bubble, BattlefieldConfig::default().ground_bubble);
        assert_eq!(config.cells.vis_range, 4);
        assert_eq!(config.active_cell_budget_ms, 10.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            SimConfig::from_json_str(r#"{ "fixed_timestep": 0.0 }"#),
            Err(ConfigError::InvalidParameter(_))
        ));
        assert!(matches!(
            SimConfig::from_json_str(r#"{ "solver": { "max_steps": 0 } }"#),
            Err(ConfigError::InvalidParameter(_))
        ));
        assert!(matches!(SimConfig::from_json_str("{ not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SimConfig::from_file("/nonexistent/csp_sim_config.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
