/*! Relief supplies, where they are stored, and how much they weigh. */

use crate::{
    error::{ReliefError, ReliefResult},
    geo::GeoPoint,
};
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/** The types of supplies this library plans deliveries for. */
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
pub enum ResourceKind {
    /// Drinking water, liters.
    Water,
    /// Meal rations.
    Food,
    /// First aid and medical kits.
    MedicalSupplies,
    Blankets,
    Tents,
    Generators,
}

impl ResourceKind {
    /// Get a string representing the name of the resource type.
    pub fn name(&self) -> &'static str {
        (*self).into()
    }

    /// Shipping weight of a single unit in kilograms.
    pub fn default_unit_weight_kg(&self) -> f64 {
        use ResourceKind::*;

        match self {
            Water => 1.0,
            Food => 0.5,
            MedicalSupplies => 0.3,
            Blankets => 2.0,
            Tents => 15.0,
            Generators => 50.0,
        }
    }
}

/// Unit weights used when packing deliveries onto vehicles.
///
/// Starts from the default weight of every `ResourceKind`, individual weights can be overridden.
/// When read from a config file, kinds that aren't listed keep their default weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<ResourceKind, f64>")]
pub struct WeightTable(HashMap<ResourceKind, f64>);

impl Default for WeightTable {
    fn default() -> Self {
        WeightTable(
            ResourceKind::iter()
                .map(|kind| (kind, kind.default_unit_weight_kg()))
                .collect(),
        )
    }
}

impl From<HashMap<ResourceKind, f64>> for WeightTable {
    fn from(overrides: HashMap<ResourceKind, f64>) -> Self {
        let mut table = WeightTable::default();
        table.0.extend(overrides);
        table
    }
}

impl WeightTable {
    /// Replace the weight of one kind of resource.
    pub fn with_weight(mut self, kind: ResourceKind, unit_weight_kg: f64) -> ReliefResult<Self> {
        if !unit_weight_kg.is_finite() || unit_weight_kg < 0.0 {
            return Err(ReliefError::invalid(format!(
                "unit weight for {} must be a non-negative number: {}",
                kind, unit_weight_kg
            )));
        }

        self.0.insert(kind, unit_weight_kg);
        Ok(self)
    }

    /// Check every weight is a non-negative number.
    pub fn validate(&self) -> ReliefResult<()> {
        match self.0.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            Some((kind, w)) => Err(ReliefError::invalid(format!(
                "unit weight for {} must be a non-negative number: {}",
                kind, w
            ))),
            None => Ok(()),
        }
    }

    pub fn unit_weight_kg(&self, kind: ResourceKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or(1.0)
    }

    /// Weight of `quantity` units of `kind` in kilograms.
    pub fn load_kg(&self, kind: ResourceKind, quantity: u32) -> f64 {
        f64::from(quantity) * self.unit_weight_kg(kind)
    }
}

/// A stock of one kind of supply held at one facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub facility_id: String,
    pub location: GeoPoint,
    /// Units on hand when the snapshot was taken. The live value is kept in the ledger.
    pub quantity: u32,
    /// The most this facility can hold.
    pub capacity: u32,
}

impl Resource {
    pub fn validate(&self) -> ReliefResult<()> {
        if self.facility_id.is_empty() {
            return Err(ReliefError::invalid(format!(
                "{} stock with an empty facility id",
                self.kind
            )));
        }

        self.location.validate().map_err(|err| {
            ReliefError::invalid(format!("facility {}: {}", self.facility_id, err))
        })
    }
}
