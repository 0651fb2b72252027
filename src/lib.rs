/*!
 * Plan emergency relief deliveries from damage assessments.
 *
 * Scattered damage reports are grouped into impact zones, the needs of each zone are matched
 * against the stock held at nearby facilities, and the resulting allocations are loaded onto
 * vehicles. Facility stock lives in a shared ledger so several areas can be planned at the same
 * time without promising the same supplies twice.
 */

pub use allocation::{cancel_allocation, Allocation, AllocationStatus};
pub use assessment::{filter_window, validate_all, Assessment, DamageType};
pub use batch::{run_batch, BatchResult};
pub use cluster::{ImpactZone, SeverityLevel, ZoneList};
pub use config::PipelineConfig;
pub use demand::{Demand, DemandModel};
pub use error::{ReliefError, ReliefResult};
pub use geo::{grid_cell_id, haversine_km, BoundingBox, GeoPoint};
pub use ledger::{Ledger, LedgerKey, LedgerStore, MemoryStore, SqliteStore, Versioned};
pub use matcher::{match_demand, MatchOutcome, MatchParams, SolutionSummary};
pub use packer::{pack_loads, PackOutcome, Route, Vehicle, VehicleKind, VehicleStatus};
pub use pipeline::{Pipeline, PipelineReport, PipelineState};
pub use resource::{Resource, ResourceKind, WeightTable};
pub use scenario::{find_scenarios, write_json, Scenario};

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod allocation;
mod assessment;
mod batch;
mod cluster;
mod config;
mod demand;
mod error;
mod geo;
mod ledger;
mod matcher;
mod packer;
mod pipeline;
mod resource;
mod scenario;
