/*!
 * Allocations, the unit of work handed to the delivery fleet.
 *
 * An allocation is created by the matcher once the units have been taken out of the ledger. From
 * then on it can only move forward, `Planned -> Assigned -> Delivered`, or be cancelled before it
 * is delivered, which puts the units back.
 */

use crate::{
    error::{ReliefError, ReliefResult},
    geo::GeoPoint,
    ledger::{Ledger, LedgerKey, LedgerStore},
    resource::ResourceKind,
};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Where an allocation is in its life.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    /// Units reserved, no vehicle yet.
    Planned,
    /// Loaded on a route.
    Assigned,
    Delivered,
}

impl AllocationStatus {
    pub fn name(&self) -> &'static str {
        (*self).into()
    }
}

/// A quantity of one resource going from one facility to one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub demand_zone_id: String,
    pub facility_id: String,
    pub resource_type: ResourceKind,
    pub quantity: u32,
    /// Straight line distance from the facility to the zone.
    pub distance_km: f32,
    pub cost_estimate: f32,
    pub status: AllocationStatus,
    /// Location of the facility.
    pub pickup: GeoPoint,
    /// Location of the zone.
    pub delivery: GeoPoint,
    /// Priority of the demand this allocation serves.
    pub priority: u8,
    /// The vehicle carrying it, once assigned.
    pub vehicle_id: Option<String>,
}

impl Allocation {
    /// The ledger entry these units were drawn from.
    pub fn ledger_key(&self) -> LedgerKey {
        LedgerKey::new(self.facility_id.clone(), self.resource_type)
    }

    /// Put this allocation on a vehicle.
    pub fn assign(&mut self, vehicle_id: &str) -> ReliefResult<()> {
        self.transition(AllocationStatus::Planned, AllocationStatus::Assigned)?;
        self.vehicle_id = Some(vehicle_id.to_owned());
        Ok(())
    }

    /// Record that the vehicle dropped this allocation off.
    pub fn mark_delivered(&mut self) -> ReliefResult<()> {
        self.transition(AllocationStatus::Assigned, AllocationStatus::Delivered)
    }

    fn transition(&mut self, from: AllocationStatus, to: AllocationStatus) -> ReliefResult<()> {
        if self.status != from {
            return Err(ReliefError::InvalidTransition {
                what: "allocation",
                from: self.status.name(),
                to: to.name(),
            });
        }

        log::debug!("allocation {}: {} -> {}", self.id, from, to);
        self.status = to;
        Ok(())
    }
}

/**
 * Cancel an allocation that hasn't been delivered and return its units to the facility.
 *
 * The allocation is consumed, it is no longer part of any plan.
 *
 * #Returns
 * The facility's quantity after the units were put back.
 */
pub fn cancel_allocation<S: LedgerStore>(
    ledger: &Ledger<S>,
    allocation: Allocation,
) -> ReliefResult<u32> {
    if allocation.status == AllocationStatus::Delivered {
        return Err(ReliefError::InvalidTransition {
            what: "allocation",
            from: allocation.status.name(),
            to: "cancelled",
        });
    }

    let restocked = ledger.add(&allocation.ledger_key(), allocation.quantity)?;

    log::info!(
        "cancelled allocation {}, returned {} {} to {}",
        allocation.id,
        allocation.quantity,
        allocation.resource_type,
        allocation.facility_id
    );

    Ok(restocked)
}
