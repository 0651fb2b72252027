/*!
 * Types and functions for working with impact zones.
 *
 * An impact zone describes the aggregate properties of a connected group (or cluster) of
 * Assessment objects.
 */

pub use impact_zone::{ImpactZone, SeverityLevel};
pub use zone_list::ZoneList;

mod impact_zone;
mod zone_list;
