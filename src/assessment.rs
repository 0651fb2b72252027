/*!
 * Scored damage observations.
 *
 * An Assessment is produced by the damage detection collaborator for a single observed location.
 * Nothing in this crate ever modifies one; they are grouped into impact zones and then dropped.
 */

use crate::{
    error::{ReliefError, ReliefResult},
    geo::GeoPoint,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The kinds of damage the detector reports.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Structural,
    Flood,
    Fire,
    Debris,
    Other,
}

/// A single scored damage observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Unique id assigned by the detection collaborator.
    pub id: String,
    /// Where the damage was observed.
    pub point: GeoPoint,
    /// How bad it is, 0 - 100.
    pub severity: u8,
    pub damage_type: DamageType,
    /// Detector confidence, 0.0 - 1.0.
    pub confidence: f32,
    pub observed_at: DateTime<Utc>,
    /// Which detector or feed produced this observation.
    pub source: String,
}

impl Assessment {
    /// Check the invariants on a record that arrived from outside the crate.
    pub fn validate(&self) -> ReliefResult<()> {
        if self.id.is_empty() {
            return Err(ReliefError::invalid("assessment with an empty id"));
        }

        self.point
            .validate()
            .map_err(|err| ReliefError::invalid(format!("assessment {}: {}", self.id, err)))?;

        if self.severity > 100 {
            return Err(ReliefError::invalid(format!(
                "assessment {}: severity {} is above 100",
                self.id, self.severity
            )));
        }

        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ReliefError::invalid(format!(
                "assessment {}: confidence {} is outside 0.0 - 1.0",
                self.id, self.confidence
            )));
        }

        Ok(())
    }

    /// Hours between the observation and `reference`. Observations stamped after the reference
    /// time are treated as brand new.
    pub fn age_hours(&self, reference: DateTime<Utc>) -> f64 {
        let age = reference.signed_duration_since(self.observed_at);
        (age.num_milliseconds() as f64 / 3_600_000.0).max(0.0)
    }

    /// Linear decay from 1.0 for a fresh observation to a floor of 0.1 at 24 hours.
    pub fn recency_weight(&self, reference: DateTime<Utc>) -> f64 {
        (1.0 - self.age_hours(reference) / 24.0).max(0.1)
    }
}

/// Validate every assessment, stopping at the first bad one.
pub fn validate_all(assessments: &[Assessment]) -> ReliefResult<()> {
    assessments.iter().try_for_each(Assessment::validate)
}

/// Keep the assessments observed in the `window_hours` before `reference`.
///
/// Anything stamped after `reference` is dropped too, it belongs to a later run.
pub fn filter_window(
    assessments: Vec<Assessment>,
    reference: DateTime<Utc>,
    window_hours: f64,
) -> Vec<Assessment> {
    let window = Duration::milliseconds((window_hours * 3_600_000.0) as i64);
    let earliest = reference - window;

    let before = assessments.len();
    let kept: Vec<Assessment> = assessments
        .into_iter()
        .filter(|a| a.observed_at >= earliest && a.observed_at <= reference)
        .collect();

    if kept.len() < before {
        log::debug!(
            "dropped {} assessments outside the {} hour window ending {}",
            before - kept.len(),
            window_hours,
            reference
        );
    }

    kept
}
