/*!
 * Greedy matching of zone demand to facility supply.
 *
 * Demands are served most urgent first and each need is filled from the nearest facilities that
 * still have stock. There is no backtracking, a zone served early can take supply that would have
 * been closer for a zone served later.
 */

use crate::{
    allocation::{Allocation, AllocationStatus},
    demand::Demand,
    error::ReliefResult,
    ledger::{Ledger, LedgerKey, LedgerStore},
    resource::{Resource, ResourceKind},
};
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

/// Tunables for a matching pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchParams {
    /// Cost per unit per kilometer.
    pub unit_cost_factor: f64,
    /// Facilities farther than this from a zone are not used for it.
    pub max_travel_distance_km: Option<f64>,
}

impl Default for MatchParams {
    fn default() -> Self {
        MatchParams {
            unit_cost_factor: 0.1,
            max_travel_distance_km: None,
        }
    }
}

/// How well a plan covers the demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionSummary {
    /// Share of the demanded units that were allocated, 0 - 100.
    pub coverage_percentage: f64,
    pub total_cost: f64,
    /// Units that could not be allocated, by kind. Kinds that were fully covered are left out.
    pub unmet_demand: BTreeMap<ResourceKind, u64>,
    pub total_demand: u64,
    pub total_allocated: u64,
    /// Matching steps abandoned because the ledger was too busy.
    pub contended_steps: u32,
}

impl Default for SolutionSummary {
    fn default() -> Self {
        SolutionSummary {
            coverage_percentage: 100.0,
            total_cost: 0.0,
            unmet_demand: BTreeMap::new(),
            total_demand: 0,
            total_allocated: 0,
            contended_steps: 0,
        }
    }
}

impl SolutionSummary {
    /**
     * Build a summary from per kind totals.
     *
     * With no demand at all there is nothing left unmet, so the coverage is 100%.
     */
    pub fn from_totals(
        needed: &BTreeMap<ResourceKind, u64>,
        allocated: &BTreeMap<ResourceKind, u64>,
        total_cost: f64,
        contended_steps: u32,
    ) -> Self {
        let unmet_demand: BTreeMap<ResourceKind, u64> = needed
            .iter()
            .map(|(kind, &need)| {
                let got = allocated.get(kind).copied().unwrap_or(0);
                (*kind, need.saturating_sub(got))
            })
            .filter(|&(_, unmet)| unmet > 0)
            .collect();

        let total_demand: u64 = needed.values().sum();
        let total_unmet: u64 = unmet_demand.values().sum();
        let total_allocated = total_demand - total_unmet;

        let coverage_percentage = if total_demand == 0 {
            100.0
        } else {
            total_allocated as f64 / total_demand as f64 * 100.0
        };

        SolutionSummary {
            coverage_percentage,
            total_cost,
            unmet_demand,
            total_demand,
            total_allocated,
            contended_steps,
        }
    }

    /// Summary for a set of demands when nothing at all could be allocated.
    pub fn nothing_allocated(demands: &[Demand]) -> Self {
        SolutionSummary::from_totals(&total_needs(demands), &BTreeMap::new(), 0.0, 0)
    }
}

impl Display for SolutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "         Coverage: {:.1}%", self.coverage_percentage)?;
        writeln!(f, "       Total Cost: {:.2}", self.total_cost)?;
        writeln!(f, "     Total Demand: {}", self.total_demand)?;
        writeln!(f, "  Total Allocated: {}", self.total_allocated)?;
        if self.contended_steps > 0 {
            writeln!(f, "  Contended Steps: {}", self.contended_steps)?;
        }

        for (kind, unmet) in &self.unmet_demand {
            writeln!(f, "{:>17}: {} unmet", kind.name(), unmet)?;
        }

        Ok(())
    }
}

/// The allocations made by a matching pass and how well they cover the demand.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub allocations: Vec<Allocation>,
    pub summary: SolutionSummary,
}

/**
 * Allocate supply to demand.
 *
 * Demands are served in order of priority (highest first), then severity (highest first), then
 * zone id. Each need is filled from facilities of the matching kind in order of distance, taking
 * as much as each one has through the ledger, until the need is met or the facilities run out.
 *
 * #Arguments
 * demands - what each zone needs.
 * resources - the facilities that may supply it. Quantities are read live from the ledger, the
 *             `quantity` field here is ignored.
 * ledger - the shared inventory, decremented for every allocation made.
 * params - cost factor and travel limit.
 * run_id - used to build unique allocation ids.
 *
 * #Returns
 * The allocations, all `Planned`, in the order they were made, and a summary. A step that keeps
 * conflicting with other writers in the ledger is skipped and counted, any other ledger error
 * stops the pass.
 */
pub fn match_demand<S: LedgerStore>(
    demands: &[Demand],
    resources: &[Resource],
    ledger: &Ledger<S>,
    params: &MatchParams,
    run_id: &str,
) -> ReliefResult<MatchOutcome> {
    let mut order: Vec<&Demand> = demands.iter().collect();
    order.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.severity_score.total_cmp(&a.severity_score))
            .then_with(|| a.zone_id.cmp(&b.zone_id))
    });

    let mut by_kind: HashMap<ResourceKind, Vec<&Resource>> = HashMap::default();
    for res in resources {
        by_kind.entry(res.kind).or_default().push(res);
    }

    let mut allocations = vec![];
    let mut allocated: BTreeMap<ResourceKind, u64> = BTreeMap::new();
    let mut total_cost = 0.0;
    let mut contended_steps = 0;

    for demand in order {
        if demand.total_need() == 0 {
            log::debug!(target: run_id, "zone {} needs nothing", demand.zone_id);
            continue;
        }

        for (&kind, &needed) in &demand.needs {
            if needed == 0 {
                continue;
            }

            let mut candidates: Vec<(f64, &Resource)> = by_kind
                .get(&kind)
                .into_iter()
                .flatten()
                .map(|&res| (res.location.distance_to(&demand.location), res))
                .filter(|&(dist, _)| params.max_travel_distance_km.map_or(true, |max| dist <= max))
                .collect();

            candidates.sort_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then_with(|| a.1.facility_id.cmp(&b.1.facility_id))
            });

            let mut remaining = needed;
            for (dist, res) in candidates {
                if remaining == 0 {
                    break;
                }

                let taken = match ledger.reserve(&LedgerKey::from(res), remaining) {
                    Ok(taken) => taken,
                    Err(err) if err.is_contention() => {
                        log::warn!(target: run_id, "skipping step for zone {}: {}", demand.zone_id, err);
                        contended_steps += 1;
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                if taken == 0 {
                    continue;
                }

                remaining -= taken;

                let cost = dist * f64::from(taken) * params.unit_cost_factor;
                total_cost += cost;

                allocations.push(Allocation {
                    id: format!("alloc-{}-{:04}", run_id, allocations.len() + 1),
                    demand_zone_id: demand.zone_id.clone(),
                    facility_id: res.facility_id.clone(),
                    resource_type: kind,
                    quantity: taken,
                    distance_km: dist as f32,
                    cost_estimate: cost as f32,
                    status: AllocationStatus::Planned,
                    pickup: res.location,
                    delivery: demand.location,
                    priority: demand.priority,
                    vehicle_id: None,
                });
            }

            *allocated.entry(kind).or_insert(0) += u64::from(needed - remaining);

            if remaining > 0 {
                log::debug!(
                    target: run_id,
                    "zone {} short {} of {} {}",
                    demand.zone_id,
                    remaining,
                    needed,
                    kind
                );
            }
        }
    }

    let summary =
        SolutionSummary::from_totals(&total_needs(demands), &allocated, total_cost, contended_steps);

    log::info!(
        target: run_id,
        "made {} allocations covering {:.1}% of demand",
        allocations.len(),
        summary.coverage_percentage
    );

    Ok(MatchOutcome {
        allocations,
        summary,
    })
}

fn total_needs(demands: &[Demand]) -> BTreeMap<ResourceKind, u64> {
    let mut needed = BTreeMap::new();
    for demand in demands {
        for (&kind, &qty) in &demand.needs {
            *needed.entry(kind).or_insert(0) += u64::from(qty);
        }
    }
    needed
}
