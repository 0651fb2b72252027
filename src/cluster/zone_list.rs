use crate::{
    assessment::Assessment,
    cluster::{ImpactZone, SeverityLevel},
    error::{ReliefError, ReliefResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/**
 * Keep a list of impact zones with metadata about the clustering run that produced them.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneList {
    /// The "now" used for recency weighting.
    reference_time: DateTime<Utc>,
    /// The linking distance used to build the zones.
    threshold_km: f64,
    /// List of ImpactZone objects associated with the above metadata.
    zones: Vec<ImpactZone>,
}

impl ZoneList {
    /**
     * Cluster a batch of assessments into impact zones.
     *
     * The assessments should already be limited to the time window of interest. Zones are named
     * `zone-0001`, `zone-0002`, ... in the order of their smallest member id.
     *
     * #Arguments
     * assessments - the already validated observations.
     * threshold_km - the single linkage distance, must be positive.
     * reference_time - "now" for the purposes of recency weighting.
     */
    pub fn from_assessments(
        assessments: &[Assessment],
        threshold_km: f64,
        reference_time: DateTime<Utc>,
    ) -> ReliefResult<Self> {
        if !threshold_km.is_finite() || threshold_km <= 0.0 {
            return Err(ReliefError::invalid(format!(
                "cluster distance must be a positive number of kilometers: {}",
                threshold_km
            )));
        }

        let zones: Vec<ImpactZone> = ImpactZone::group_assessments(assessments, threshold_km)
            .into_iter()
            .enumerate()
            .map(|(i, members)| {
                ImpactZone::from_members(format!("zone-{:04}", i + 1), &members, reference_time)
            })
            .collect();

        log::debug!(
            "clustered {} assessments into {} zones at {} km",
            assessments.len(),
            zones.len(),
            threshold_km
        );

        Ok(ZoneList {
            reference_time,
            threshold_km,
            zones,
        })
    }

    /// Get the reference time used for recency weighting.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    /// Get the linking distance used for the clustering.
    pub fn threshold_km(&self) -> f64 {
        self.threshold_km
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Get a view of the zones.
    pub fn zones(&self) -> &[ImpactZone] {
        &self.zones
    }

    /// Get an iterator over the zones at or above a severity level.
    pub fn at_least(&self, level: SeverityLevel) -> impl Iterator<Item = &ImpactZone> {
        self.zones
            .iter()
            .filter(move |zone| zone.severity_level() >= level)
    }

    /// Take the zones out of the list.
    pub fn take_zones(self) -> Vec<ImpactZone> {
        self.zones
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{assessment::DamageType, geo::GeoPoint};
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn assessment(id: &str, lat: f64, lon: f64, severity: u8) -> Assessment {
        Assessment {
            id: id.to_owned(),
            point: GeoPoint {
                latitude: lat,
                longitude: lon,
            },
            severity,
            damage_type: DamageType::Fire,
            confidence: 0.9,
            observed_at: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
            source: "test".to_owned(),
        }
    }

    fn member_sets(list: &ZoneList) -> BTreeSet<Vec<String>> {
        list.zones().iter().map(|z| z.member_ids.clone()).collect()
    }

    #[test]
    fn test_order_does_not_matter() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let batch = vec![
            assessment("a", 40.0, -74.0, 70),
            assessment("b", 40.005, -74.0, 60),
            assessment("c", 40.5, -74.0, 90),
            assessment("d", 40.0095, -74.0, 40),
            assessment("e", 40.505, -74.001, 30),
            assessment("f", 12.0, 100.0, 10),
        ];

        let expected = member_sets(&ZoneList::from_assessments(&batch, 1.0, now).unwrap());
        assert_eq!(expected.len(), 3);

        // Walk through every rotation and the reverse of each.
        for shift in 0..batch.len() {
            let mut permuted = batch.clone();
            permuted.rotate_left(shift);

            let list = ZoneList::from_assessments(&permuted, 1.0, now).unwrap();
            assert_eq!(member_sets(&list), expected);

            permuted.reverse();
            let list = ZoneList::from_assessments(&permuted, 1.0, now).unwrap();
            assert_eq!(member_sets(&list), expected);
        }
    }

    #[test]
    fn test_zone_names_and_filters() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let batch = vec![
            assessment("z", 10.0, 10.0, 95),
            assessment("m", -10.0, -10.0, 20),
        ];

        let list = ZoneList::from_assessments(&batch, 1.0, now).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.zones()[0].id, "zone-0001");
        assert_eq!(list.zones()[0].member_ids, vec!["m".to_owned()]);
        assert_eq!(list.zones()[1].id, "zone-0002");

        let critical: Vec<&str> = list
            .at_least(SeverityLevel::Critical)
            .map(|z| z.id.as_str())
            .collect();
        assert_eq!(critical, vec!["zone-0002"]);
    }

    #[test]
    fn test_bad_threshold() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(ZoneList::from_assessments(&[], 0.0, now).is_err());
        assert!(ZoneList::from_assessments(&[], f64::NAN, now).is_err());
        assert!(ZoneList::from_assessments(&[], 1.0, now).unwrap().is_empty());
    }
}
