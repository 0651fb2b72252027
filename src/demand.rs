/*!
 * What an impact zone needs.
 *
 * Demand is estimated from the zone itself: a rough head count from the number of reports and the
 * area they cover, scaled by how bad the damage is.
 */

use crate::{
    cluster::ImpactZone,
    error::{ReliefError, ReliefResult},
    geo::GeoPoint,
    resource::ResourceKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The resource needs of one impact zone for a single allocation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    pub zone_id: String,
    /// Where deliveries for this zone go.
    pub location: GeoPoint,
    /// Units needed of each kind. Kinds that aren't needed are left out.
    pub needs: BTreeMap<ResourceKind, u32>,
    /// 1 (lowest) - 10 (highest).
    pub priority: u8,
    pub severity_score: f32,
}

impl Demand {
    /// Estimate what a zone needs using `model`.
    pub fn from_zone(zone: &ImpactZone, model: &DemandModel) -> Self {
        let population = f64::from(zone.member_count) * model.people_per_assessment
            + f64::from(zone.affected_area_km2) * model.people_per_km2;
        let severity_factor = (f64::from(zone.severity_score) / 100.0).clamp(0.0, 1.0);

        let needs: BTreeMap<ResourceKind, u32> = model
            .per_capita
            .iter()
            .map(|(&kind, &rate)| (kind, (population * rate * severity_factor).floor() as u32))
            .filter(|&(_, qty)| qty > 0)
            .collect();

        let priority = ((severity_factor * 10.0).floor() as u8).clamp(1, 10);

        Demand {
            zone_id: zone.id.clone(),
            location: zone.centroid,
            needs,
            priority,
            severity_score: zone.severity_score,
        }
    }

    /// Total units needed across every kind.
    pub fn total_need(&self) -> u64 {
        self.needs.values().map(|&q| u64::from(q)).sum()
    }
}

/// Parameters for turning an impact zone into a Demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandModel {
    /// Estimated people affected per damage report.
    pub people_per_assessment: f64,
    /// Estimated people per square kilometer of affected area.
    pub people_per_km2: f64,
    /// Units of each kind needed per person at full severity.
    pub per_capita: BTreeMap<ResourceKind, f64>,
}

impl Default for DemandModel {
    fn default() -> Self {
        use ResourceKind::*;

        DemandModel {
            people_per_assessment: 100.0,
            people_per_km2: 1000.0,
            per_capita: [
                (Water, 3.0),
                (Food, 2.0),
                (MedicalSupplies, 0.1),
                (Blankets, 0.5),
                (Tents, 0.2),
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl DemandModel {
    pub fn validate(&self) -> ReliefResult<()> {
        let rates = [self.people_per_assessment, self.people_per_km2]
            .into_iter()
            .chain(self.per_capita.values().copied());

        for rate in rates {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ReliefError::invalid(format!(
                    "demand model rates must be non-negative numbers: {}",
                    rate
                )));
            }
        }

        Ok(())
    }
}
