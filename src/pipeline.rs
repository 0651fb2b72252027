/*!
 * Sequencing the stages of a planning run.
 *
 * A Pipeline takes one scenario through clustering, matching and packing. It is a small state
 * machine so a run can be inspected afterwards: which stages ran, and where it stopped if it
 * failed. A stage is never started once an earlier one has failed.
 */

use crate::{
    allocation::Allocation,
    assessment,
    cluster::{ImpactZone, ZoneList},
    config::PipelineConfig,
    demand::Demand,
    error::{ReliefError, ReliefResult},
    ledger::{Ledger, LedgerKey, LedgerStore},
    matcher::{self, SolutionSummary},
    packer::{self, PackOutcome, Route},
    resource::Resource,
    scenario::Scenario,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, IntoStaticStr};

/// The stages of a planning run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Clustering,
    Matching,
    Packing,
    Complete,
    Failed,
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        (*self).into()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed)
    }

    /// Is moving from this state to `next` allowed?
    pub fn can_move_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (*self, next) {
            (Idle, Clustering) => true,
            (Clustering, Matching) | (Clustering, Complete) => true,
            (Matching, Packing) | (Matching, Complete) => true,
            (Packing, Complete) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub pipeline_id: String,
    /// Every state the pipeline passed through, in order.
    pub stages: Vec<PipelineState>,
    pub zones: Vec<ImpactZone>,
    pub demands: Vec<Demand>,
    pub allocations: Vec<Allocation>,
    pub routes: Vec<Route>,
    /// Allocations that are planned but didn't fit on a vehicle.
    pub unassigned: Vec<String>,
    pub summary: SolutionSummary,
}

impl PipelineReport {
    /// Was the given stage entered during the run?
    pub fn visited(&self, state: PipelineState) -> bool {
        self.stages.contains(&state)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let stages: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();

        writeln!(f, "         Pipeline: {}", self.pipeline_id)?;
        writeln!(f, "           Stages: {}", stages.join(" -> "))?;
        writeln!(f, "            Zones: {}", self.zones.len())?;
        writeln!(f, "      Allocations: {}", self.allocations.len())?;
        writeln!(f, "           Routes: {}", self.routes.len())?;
        writeln!(f, "       Unassigned: {}", self.unassigned.len())?;
        write!(f, "{}", self.summary)
    }
}

/// Runs one scenario against a shared ledger.
pub struct Pipeline<'a, S> {
    id: String,
    config: &'a PipelineConfig,
    ledger: &'a Ledger<S>,
    state: PipelineState,
    stages: Vec<PipelineState>,
    failed_at: Option<PipelineState>,
}

impl<'a, S: LedgerStore> Pipeline<'a, S> {
    pub fn new<T: Into<String>>(id: T, config: &'a PipelineConfig, ledger: &'a Ledger<S>) -> Self {
        Pipeline {
            id: id.into(),
            config,
            ledger,
            state: PipelineState::Idle,
            stages: vec![PipelineState::Idle],
            failed_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The stage that was running when the pipeline failed, if it did.
    pub fn failed_at(&self) -> Option<PipelineState> {
        self.failed_at
    }

    /// Every state entered so far.
    pub fn stages(&self) -> &[PipelineState] {
        &self.stages
    }

    /**
     * Plan deliveries for a scenario.
     *
     * A pipeline only runs once. The configuration and the scenario are checked before any stage
     * starts, so a rejected run leaves the ledger as it found it. If there are no zones the run
     * completes right after clustering, if there is no supply it completes right after deriving
     * demand with nothing allocated.
     *
     * #Returns
     * The report on success. Any error is wrapped in `StageFailed` naming the stage that was
     * running, and the pipeline is left `Failed`.
     */
    pub fn run(&mut self, scenario: Scenario) -> ReliefResult<PipelineReport> {
        if self.state != PipelineState::Idle {
            return Err(ReliefError::InvalidTransition {
                what: "pipeline",
                from: self.state.name(),
                to: PipelineState::Clustering.name(),
            });
        }

        // Nothing touches the ledger until both the settings and the inputs check out.
        if let Err(err) = self.config.validate().and_then(|_| scenario.validate()) {
            return Err(self.fail(err));
        }

        let config = self.config;
        let ledger = self.ledger;

        //
        // Clustering
        //
        self.advance(PipelineState::Clustering)?;

        let assessments = match config.time_window_hours {
            Some(hours) => {
                assessment::filter_window(scenario.assessments, scenario.reference_time, hours)
            }
            None => scenario.assessments,
        };

        let zones = ZoneList::from_assessments(
            &assessments,
            config.cluster_distance_km,
            scenario.reference_time,
        )
        .map_err(|err| self.fail(err))?
        .take_zones();

        if zones.is_empty() {
            log::info!(target: self.id.as_str(), "no impact zones, nothing to do");
            self.advance(PipelineState::Complete)?;
            let summary = SolutionSummary::default();
            return Ok(self.report(vec![], vec![], vec![], PackOutcome::default(), summary));
        }

        //
        // Matching
        //
        self.advance(PipelineState::Matching)?;

        let demands: Vec<Demand> = zones
            .iter()
            .map(|zone| Demand::from_zone(zone, &config.demand_model))
            .collect();

        let has_supply = self
            .has_supply(&scenario.resources)
            .map_err(|err| self.fail(err))?;

        if !has_supply {
            log::info!(
                target: self.id.as_str(),
                "no supply available for {} zones",
                zones.len()
            );
            let summary = SolutionSummary::nothing_allocated(&demands);
            self.advance(PipelineState::Complete)?;
            return Ok(self.report(zones, demands, vec![], PackOutcome::default(), summary));
        }

        let matcher::MatchOutcome {
            mut allocations,
            summary,
        } = matcher::match_demand(
            &demands,
            &scenario.resources,
            ledger,
            &config.match_params(),
            &self.id,
        )
        .map_err(|err| self.fail(err))?;

        //
        // Packing
        //
        self.advance(PipelineState::Packing)?;

        let packed = packer::pack_loads(
            &mut allocations,
            &scenario.vehicles,
            &config.unit_weights,
            config.average_speed_kmh,
        )
        .map_err(|err| self.fail(err))?;

        self.advance(PipelineState::Complete)?;

        Ok(self.report(zones, demands, allocations, packed, summary))
    }

    fn has_supply(&self, resources: &[Resource]) -> ReliefResult<bool> {
        for res in resources {
            if self.ledger.read(&LedgerKey::from(res))? > 0 {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn advance(&mut self, next: PipelineState) -> ReliefResult<()> {
        if !self.state.can_move_to(next) {
            return Err(ReliefError::InvalidTransition {
                what: "pipeline",
                from: self.state.name(),
                to: next.name(),
            });
        }

        log::info!(target: self.id.as_str(), "{} -> {}", self.state, next);
        self.state = next;
        self.stages.push(next);
        Ok(())
    }

    /// Move to `Failed` and wrap the error with the stage it happened in.
    fn fail(&mut self, cause: ReliefError) -> ReliefError {
        let stage = self.state;

        log::warn!(target: self.id.as_str(), "failed during {}: {}", stage, cause);

        if self.state.can_move_to(PipelineState::Failed) {
            self.state = PipelineState::Failed;
            self.stages.push(PipelineState::Failed);
            self.failed_at = Some(stage);
        }

        ReliefError::StageFailed {
            stage,
            cause: Box::new(cause),
        }
    }

    fn report(
        &self,
        zones: Vec<ImpactZone>,
        demands: Vec<Demand>,
        allocations: Vec<Allocation>,
        packed: PackOutcome,
        summary: SolutionSummary,
    ) -> PipelineReport {
        PipelineReport {
            pipeline_id: self.id.clone(),
            stages: self.stages.clone(),
            zones,
            demands,
            allocations,
            routes: packed.routes,
            unassigned: packed.unassigned,
            summary,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        assessment::{Assessment, DamageType},
        geo::GeoPoint,
        ledger::MemoryStore,
        packer::{Vehicle, VehicleKind, VehicleStatus},
        resource::ResourceKind,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn assessment(id: &str, lat: f64, lon: f64, severity: u8) -> Assessment {
        Assessment {
            id: id.to_owned(),
            point: GeoPoint {
                latitude: lat,
                longitude: lon,
            },
            severity,
            damage_type: DamageType::Structural,
            confidence: 0.9,
            observed_at: now() - Duration::hours(1),
            source: "test".to_owned(),
        }
    }

    fn scenario(assessments: Vec<Assessment>, resources: Vec<Resource>) -> Scenario {
        Scenario {
            id: "test".to_owned(),
            reference_time: now(),
            assessments,
            resources,
            vehicles: vec![Vehicle {
                id: "truck-1".to_owned(),
                kind: VehicleKind::Truck,
                capacity_kg: 5000,
                location: GeoPoint {
                    latitude: 40.0,
                    longitude: -74.0,
                },
                status: VehicleStatus::Available,
            }],
        }
    }

    fn water(quantity: u32) -> Resource {
        Resource {
            kind: ResourceKind::Water,
            facility_id: "wh-1".to_owned(),
            location: GeoPoint {
                latitude: 40.02,
                longitude: -74.0,
            },
            quantity,
            capacity: 10_000,
        }
    }

    #[test]
    fn test_state_machine() {
        use PipelineState::*;

        assert!(Idle.can_move_to(Clustering));
        assert!(Clustering.can_move_to(Complete));
        assert!(Matching.can_move_to(Complete));
        assert!(Packing.can_move_to(Failed));
        assert!(!Idle.can_move_to(Packing));
        assert!(!Complete.can_move_to(Failed));
        assert!(!Failed.can_move_to(Clustering));
    }

    #[test]
    fn test_no_assessments() {
        let config = PipelineConfig::default();
        let ledger = Ledger::new(MemoryStore::new());
        ledger.seed(&[water(100)]).unwrap();

        let mut pipeline = Pipeline::new("empty", &config, &ledger);
        let report = pipeline.run(scenario(vec![], vec![water(100)])).unwrap();

        assert_eq!(pipeline.state(), PipelineState::Complete);
        assert_eq!(
            report.stages,
            vec![
                PipelineState::Idle,
                PipelineState::Clustering,
                PipelineState::Complete
            ]
        );
        assert!(report.zones.is_empty());
        assert!(!report.visited(PipelineState::Matching));
        assert!(!report.visited(PipelineState::Packing));
        assert_eq!(report.summary, SolutionSummary::default());

        // A pipeline only runs once.
        assert!(pipeline.run(scenario(vec![], vec![])).is_err());
    }

    #[test]
    fn test_no_supply() {
        let config = PipelineConfig::default();
        let ledger = Ledger::new(MemoryStore::new());

        let mut pipeline = Pipeline::new("dry", &config, &ledger);
        let report = pipeline
            .run(scenario(vec![assessment("a", 40.0, -74.0, 90)], vec![water(100)]))
            .unwrap();

        assert_eq!(
            report.stages,
            vec![
                PipelineState::Idle,
                PipelineState::Clustering,
                PipelineState::Matching,
                PipelineState::Complete
            ]
        );
        assert_eq!(report.zones.len(), 1);
        assert!(report.allocations.is_empty());
        assert_eq!(report.summary.coverage_percentage, 0.0);
        assert_eq!(report.summary.total_allocated, 0);
        assert_eq!(
            report.summary.unmet_demand.values().sum::<u64>(),
            report.summary.total_demand
        );
    }

    #[test]
    fn test_full_run() {
        let config = PipelineConfig::default();
        let ledger = Ledger::new(MemoryStore::new());
        ledger.seed(&[water(100)]).unwrap();

        let mut pipeline = Pipeline::new("full", &config, &ledger);
        let report = pipeline
            .run(scenario(
                vec![
                    assessment("a", 40.0, -74.0, 90),
                    assessment("b", 40.0001, -74.0001, 70),
                ],
                vec![water(100)],
            ))
            .unwrap();

        assert_eq!(report.stages.last(), Some(&PipelineState::Complete));
        assert!(report.visited(PipelineState::Packing));
        assert_eq!(report.zones.len(), 1);
        assert_eq!(report.zones[0].member_count, 2);

        // Only water was stocked, the whole 100 units go out on the truck.
        assert_eq!(report.allocations.len(), 1);
        assert_eq!(report.allocations[0].quantity, 100);
        assert_eq!(report.routes.len(), 1);
        assert_eq!(report.routes[0].vehicle_id, "truck-1");
        assert!(report.unassigned.is_empty());
        assert!(report.summary.coverage_percentage < 100.0);
        assert!(report.summary.unmet_demand.contains_key(&ResourceKind::Food));

        assert_eq!(ledger.read(&LedgerKey::from(&water(0))).unwrap(), 0);
    }

    #[test]
    fn test_invalid_input_fails_before_clustering() {
        let config = PipelineConfig::default();
        let ledger = Ledger::new(MemoryStore::new());

        let mut bad = assessment("a", 40.0, -74.0, 90);
        bad.point.latitude = 91.0;

        let mut pipeline = Pipeline::new("bad", &config, &ledger);
        let err = pipeline.run(scenario(vec![bad], vec![])).unwrap_err();

        match err {
            ReliefError::StageFailed { stage, cause } => {
                assert_eq!(stage, PipelineState::Idle);
                assert!(matches!(*cause, ReliefError::InvalidInput(_)));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(pipeline.failed_at(), Some(PipelineState::Idle));
        assert!(!pipeline.stages().contains(&PipelineState::Clustering));
    }

    #[test]
    fn test_bad_config_leaves_ledger_untouched() {
        let config = PipelineConfig {
            average_speed_kmh: 0.0,
            ..PipelineConfig::default()
        };
        let ledger = Ledger::new(MemoryStore::new());
        ledger.seed(&[water(100)]).unwrap();

        let mut pipeline = Pipeline::new("stalled", &config, &ledger);
        let err = pipeline
            .run(scenario(vec![assessment("a", 40.0, -74.0, 90)], vec![water(100)]))
            .unwrap_err();

        match err {
            ReliefError::StageFailed { stage, cause } => {
                assert_eq!(stage, PipelineState::Idle);
                assert!(matches!(*cause, ReliefError::InvalidInput(_)));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert_eq!(pipeline.failed_at(), Some(PipelineState::Idle));
        assert!(!pipeline.stages().contains(&PipelineState::Clustering));
        assert_eq!(ledger.read(&LedgerKey::from(&water(0))).unwrap(), 100);

        // A window that isn't a real duration is caught the same way.
        let config = PipelineConfig {
            time_window_hours: Some(f64::NAN),
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::new("no-window", &config, &ledger);
        assert!(pipeline
            .run(scenario(vec![assessment("a", 40.0, -74.0, 90)], vec![water(100)]))
            .is_err());
        assert_eq!(pipeline.failed_at(), Some(PipelineState::Idle));
        assert_eq!(ledger.read(&LedgerKey::from(&water(0))).unwrap(), 100);
    }

    /// Reads work but every write hits a broken disk.
    struct ReadOnlyStore(MemoryStore);

    impl LedgerStore for ReadOnlyStore {
        fn read(&self, key: &LedgerKey) -> ReliefResult<crate::ledger::Versioned> {
            self.0.read(key)
        }

        fn compare_and_swap(&self, _: &LedgerKey, _: u64, _: u32) -> ReliefResult<bool> {
            Err(ReliefError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk is read only",
            )))
        }

        fn put(&self, key: &LedgerKey, quantity: u32) -> ReliefResult<()> {
            self.0.put(key, quantity)
        }

        fn entries(&self) -> ReliefResult<Vec<(LedgerKey, u32)>> {
            self.0.entries()
        }
    }

    #[test]
    fn test_storage_error_fails_matching() {
        let config = PipelineConfig::default();
        let stocks = MemoryStore::new();
        stocks.put(&LedgerKey::from(&water(0)), 100).unwrap();
        let ledger = Ledger::new(ReadOnlyStore(stocks));

        let mut pipeline = Pipeline::new("broken", &config, &ledger);
        let err = pipeline
            .run(scenario(vec![assessment("a", 40.0, -74.0, 90)], vec![water(100)]))
            .unwrap_err();

        match err {
            ReliefError::StageFailed { stage, cause } => {
                assert_eq!(stage, PipelineState::Matching);
                assert!(matches!(*cause, ReliefError::Io(_)));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(pipeline.failed_at(), Some(PipelineState::Matching));
        assert!(!pipeline.stages().contains(&PipelineState::Packing));
        assert_eq!(ledger.read(&LedgerKey::from(&water(0))).unwrap(), 100);
    }
}
