/*!
 * Tunable parameters for a planning run.
 */

use crate::{
    demand::DemandModel,
    error::{ReliefError, ReliefResult},
    ledger::DEFAULT_MAX_ATTEMPTS,
    matcher::MatchParams,
    resource::WeightTable,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every knob in the pipeline. Fields missing from a config file take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Single linkage distance for clustering.
    pub cluster_distance_km: f64,
    /// Only assessments this recent are clustered. `None` uses everything.
    pub time_window_hours: Option<f64>,
    pub unit_cost_factor: f64,
    pub max_travel_distance_km: Option<f64>,
    pub average_speed_kmh: f64,
    /// Retry budget for ledger updates.
    pub ledger_max_attempts: u32,
    pub unit_weights: WeightTable,
    pub demand_model: DemandModel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            cluster_distance_km: 1.0,
            time_window_hours: Some(24.0),
            unit_cost_factor: 0.1,
            max_travel_distance_km: None,
            average_speed_kmh: 50.0,
            ledger_max_attempts: DEFAULT_MAX_ATTEMPTS,
            unit_weights: WeightTable::default(),
            demand_model: DemandModel::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file and validate it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ReliefResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ReliefResult<()> {
        let positive = [
            ("cluster_distance_km", Some(self.cluster_distance_km)),
            ("time_window_hours", self.time_window_hours),
            ("average_speed_kmh", Some(self.average_speed_kmh)),
            ("max_travel_distance_km", self.max_travel_distance_km),
        ];

        for (name, val) in positive {
            if let Some(val) = val {
                if !val.is_finite() || val <= 0.0 {
                    return Err(ReliefError::invalid(format!(
                        "{} must be a positive number: {}",
                        name, val
                    )));
                }
            }
        }

        if !self.unit_cost_factor.is_finite() || self.unit_cost_factor < 0.0 {
            return Err(ReliefError::invalid(format!(
                "unit_cost_factor must be a non-negative number: {}",
                self.unit_cost_factor
            )));
        }

        if self.ledger_max_attempts == 0 {
            return Err(ReliefError::invalid("ledger_max_attempts must be at least 1"));
        }

        self.unit_weights.validate()?;
        self.demand_model.validate()
    }

    pub fn match_params(&self) -> MatchParams {
        MatchParams {
            unit_cost_factor: self.unit_cost_factor,
            max_travel_distance_km: self.max_travel_distance_km,
        }
    }
}
