/*!
 * Loading planned allocations onto vehicles.
 *
 * Each available vehicle, in fleet order, takes the allocations nearest to it that still fit in
 * what is left of its weight capacity. This is first fit by proximity, not an optimal packing.
 */

use crate::{
    allocation::{Allocation, AllocationStatus},
    error::{ReliefError, ReliefResult},
    geo::GeoPoint,
    resource::WeightTable,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The kinds of vehicles in the delivery fleet.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    Truck,
    Helicopter,
    Boat,
}

impl VehicleKind {
    pub fn name(&self) -> &'static str {
        (*self).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Available,
    Deployed,
    Maintenance,
}

/// A member of the delivery fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: VehicleKind,
    pub capacity_kg: u32,
    /// Where the vehicle is now.
    pub location: GeoPoint,
    pub status: VehicleStatus,
}

impl Vehicle {
    pub fn validate(&self) -> ReliefResult<()> {
        if self.id.is_empty() {
            return Err(ReliefError::invalid(format!(
                "{} with an empty id",
                self.kind
            )));
        }

        self.location
            .validate()
            .map_err(|err| ReliefError::invalid(format!("vehicle {}: {}", self.id, err)))
    }
}

/// The allocations carried by one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub vehicle_id: String,
    pub vehicle_kind: VehicleKind,
    /// In the order they were loaded.
    pub allocation_ids: Vec<String>,
    pub total_distance_km: f32,
    pub total_load_kg: f32,
    pub duration_hours: f32,
}

/// The result of a packing pass.
#[derive(Debug, Clone, Default)]
pub struct PackOutcome {
    pub routes: Vec<Route>,
    /// Ids of allocations that didn't fit on any vehicle. They are still `Planned`.
    pub unassigned: Vec<String>,
}

/**
 * Pack planned allocations onto the available vehicles.
 *
 * Allocations that are loaded are moved to `Assigned` and tagged with the vehicle id, so they are
 * updated in place.
 *
 * #Arguments
 * allocations - the allocations to pack. Only those still `Planned` are considered.
 * fleet - vehicles are loaded in this order, only `Available` ones are used.
 * weights - unit weights of each resource kind.
 * average_speed_kmh - used for the route duration estimate.
 */
pub fn pack_loads(
    allocations: &mut [Allocation],
    fleet: &[Vehicle],
    weights: &WeightTable,
    average_speed_kmh: f64,
) -> ReliefResult<PackOutcome> {
    if !average_speed_kmh.is_finite() || average_speed_kmh <= 0.0 {
        return Err(ReliefError::invalid(format!(
            "average speed must be a positive number: {}",
            average_speed_kmh
        )));
    }

    let mut routes = vec![];

    for vehicle in fleet
        .iter()
        .filter(|v| v.status == VehicleStatus::Available)
    {
        let mut remaining_kg = f64::from(vehicle.capacity_kg);

        let mut candidates: Vec<(f64, f64, usize)> = allocations
            .iter()
            .enumerate()
            .filter(|(_, a)| a.status == AllocationStatus::Planned && a.vehicle_id.is_none())
            .map(|(i, a)| {
                let dist = vehicle.location.distance_to(&a.pickup);
                let weight = weights.load_kg(a.resource_type, a.quantity);
                (dist, weight, i)
            })
            .filter(|&(_, weight, _)| weight <= remaining_kg)
            .collect();

        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| allocations[a.2].id.cmp(&allocations[b.2].id))
        });

        let mut allocation_ids = vec![];
        let mut total_distance_km = 0.0;
        let mut total_load_kg = 0.0;

        for (_, weight, i) in candidates {
            if weight > remaining_kg {
                continue;
            }

            let alloc = &mut allocations[i];
            alloc.assign(&vehicle.id)?;

            remaining_kg -= weight;
            total_load_kg += weight;
            total_distance_km += f64::from(alloc.distance_km);
            allocation_ids.push(alloc.id.clone());
        }

        if allocation_ids.is_empty() {
            continue;
        }

        log::debug!(
            "{} {} carries {} allocations, {:.1} of {} kg",
            vehicle.kind,
            vehicle.id,
            allocation_ids.len(),
            total_load_kg,
            vehicle.capacity_kg
        );

        routes.push(Route {
            vehicle_id: vehicle.id.clone(),
            vehicle_kind: vehicle.kind,
            allocation_ids,
            total_distance_km: total_distance_km as f32,
            total_load_kg: total_load_kg as f32,
            duration_hours: (total_distance_km / average_speed_kmh) as f32,
        });
    }

    let unassigned: Vec<String> = allocations
        .iter()
        .filter(|a| a.status == AllocationStatus::Planned)
        .map(|a| a.id.clone())
        .collect();

    if !unassigned.is_empty() {
        log::info!("{} allocations did not fit on any vehicle", unassigned.len());
    }

    Ok(PackOutcome { routes, unassigned })
}
