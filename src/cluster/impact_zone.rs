use crate::{
    assessment::{Assessment, DamageType},
    geo::{BoundingBox, GeoPoint, KM_PER_DEGREE},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, IntoStaticStr};

/// Area assigned to a zone built from a single assessment, one hectare.
const SINGLETON_AREA_KM2: f64 = 0.01;

/// Coarse ranking of a zone's severity score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub fn from_score(score: f32) -> Self {
        use SeverityLevel::*;

        if score >= 80.0 {
            Critical
        } else if score >= 60.0 {
            High
        } else if score >= 40.0 {
            Medium
        } else {
            Low
        }
    }
}

/**
 * The aggregate properties of a connected group of Assessment objects.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactZone {
    /// Identifier, unique within a single clustering run.
    pub id: String,
    /// Average location of the assessments in the zone.
    pub centroid: GeoPoint,
    /// Confidence and recency weighted mean severity, 0 - 100.
    pub severity_score: f32,
    /// The number of assessments in this zone.
    pub member_count: u32,
    /// Every kind of damage reported in the zone.
    pub damage_types: BTreeSet<DamageType>,
    /// Mean detector confidence of the members.
    pub confidence: f32,
    /// Rough estimate of the ground covered by the zone.
    pub affected_area_km2: f32,
    /// Ids of the member assessments, sorted.
    pub member_ids: Vec<String>,
}

impl ImpactZone {
    /**
     * Group Assessment objects by spatial connectivity.
     *
     * Two assessments are in the same group if they are within `threshold_km` of each other, or
     * if they can be linked through a chain of assessments where each hop is within
     * `threshold_km`. So two members of a group may be much farther apart than the threshold.
     *
     * Members of each group are sorted by id and the groups are sorted by their first member, so
     * the output does not depend on the order of the input.
     *
     * #Arguments
     * assessments - the observations to group.
     * threshold_km - the linking distance.
     *
     * #Returns
     * A list of groups, each a list of references into `assessments`.
     */
    pub fn group_assessments(assessments: &[Assessment], threshold_km: f64) -> Vec<Vec<&Assessment>> {
        // The great circle distance is never less than the distance along a meridian, so anything
        // farther than this in latitude can't be linked and we skip the trig.
        let lat_band = threshold_km / KM_PER_DEGREE;

        let mut by_lat: Vec<usize> = (0..assessments.len()).collect();
        by_lat.sort_by(|&a, &b| {
            assessments[a]
                .point
                .latitude
                .total_cmp(&assessments[b].point.latitude)
        });
        let lats: Vec<f64> = by_lat
            .iter()
            .map(|&i| assessments[i].point.latitude)
            .collect();

        let mut assigned = vec![false; assessments.len()];
        let mut groups: Vec<Vec<&Assessment>> = vec![];
        let mut frontier: Vec<usize> = vec![];

        for seed in 0..assessments.len() {
            if assigned[seed] {
                continue;
            }

            assigned[seed] = true;
            frontier.push(seed);
            let mut group = vec![];

            while let Some(curr) = frontier.pop() {
                let curr_pt = assessments[curr].point;
                group.push(&assessments[curr]);

                let start = lats.partition_point(|&lat| lat < curr_pt.latitude - lat_band);
                let end = lats.partition_point(|&lat| lat <= curr_pt.latitude + lat_band);

                for &candidate in &by_lat[start..end] {
                    if assigned[candidate] {
                        continue;
                    }

                    if curr_pt.distance_to(&assessments[candidate].point) <= threshold_km {
                        assigned[candidate] = true;
                        frontier.push(candidate);
                    }
                }
            }

            group.sort_by(|a, b| a.id.cmp(&b.id));
            groups.push(group);
        }

        groups.sort_by(|a, b| a[0].id.cmp(&b[0].id));
        groups
    }

    /**
     * Aggregate a group of assessments into a zone.
     *
     * The severity is weighted by `confidence * recency_weight`. If every weight is zero we fall
     * back to the plain mean of the severities.
     *
     * #Arguments
     * id - the identifier for the new zone.
     * members - the assessments in the zone, must not be empty.
     * reference - the time used to compute the age of each assessment.
     */
    pub fn from_members(id: String, members: &[&Assessment], reference: DateTime<Utc>) -> Self {
        debug_assert!(!members.is_empty());

        let centroid = GeoPoint::mean(members.iter().map(|a| a.point)).unwrap_or(GeoPoint {
            latitude: f64::NAN,
            longitude: f64::NAN,
        });

        let mut total_weight = 0.0;
        let mut weighted_severity = 0.0;
        let mut total_confidence = 0.0;
        let mut damage_types = BTreeSet::new();

        for member in members {
            let weight = f64::from(member.confidence) * member.recency_weight(reference);
            weighted_severity += f64::from(member.severity) * weight;
            total_weight += weight;
            total_confidence += f64::from(member.confidence);
            damage_types.insert(member.damage_type);
        }

        let count = members.len() as f64;

        let severity_score = if total_weight > 0.0 {
            weighted_severity / total_weight
        } else {
            members.iter().map(|m| f64::from(m.severity)).sum::<f64>() / count
        };

        let affected_area_km2 = if members.len() > 1 {
            BoundingBox::enclosing(members.iter().map(|a| a.point))
                .map(|bbox| bbox.approx_area_km2())
                .unwrap_or(SINGLETON_AREA_KM2)
        } else {
            SINGLETON_AREA_KM2
        };

        ImpactZone {
            id,
            centroid,
            severity_score: severity_score as f32,
            member_count: members.len() as u32,
            damage_types,
            confidence: (total_confidence / count) as f32,
            affected_area_km2: affected_area_km2 as f32,
            member_ids: members.iter().map(|a| a.id.clone()).collect(),
        }
    }

    pub fn severity_level(&self) -> SeverityLevel {
        SeverityLevel::from_score(self.severity_score)
    }
}
