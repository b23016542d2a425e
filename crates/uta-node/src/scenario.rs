//! Scenario documents: which mobiles to seed and where.
//!
//! Step kinds are not spelled out in the JSON — each step is just an entity
//! ID, and the ID's first character already says what it is.  Bus and tram
//! scenarios carry one segment (their routes are single cyclic loops);
//! pedestrians and cars carry exactly three (house→work, work→fun,
//! fun→home).

use serde::Deserialize;
use uta_core::{EntityId, EntityKind};
use uta_entities::{MobileKind, MobileSpec};
use uta_route::{Route, Step};

/// Default dwell at bus/tram stops when a seed doesn't say otherwise.
const DEFAULT_DWELL_TICKS: u32 = 2;

#[derive(Debug, Deserialize)]
pub struct ScenarioDoc {
    pub mobiles: Vec<MobileSeed>,
}

#[derive(Debug, Deserialize)]
pub struct MobileSeed {
    pub id:   EntityId,
    pub kind: MobileKind,
    /// The immovable that creates (and later respawns) this mobile.
    pub host: EntityId,
    /// Segments as lists of entity IDs.  Three for pedestrians/cars, one
    /// for buses/trams.
    pub segments: Vec<Vec<EntityId>>,
    #[serde(default = "default_rest")]
    pub rest_ticks: u32,
    #[serde(default = "default_dwell")]
    pub stop_dwell_ticks: u32,
}

fn default_rest() -> u32 {
    8
}

fn default_dwell() -> u32 {
    DEFAULT_DWELL_TICKS
}

impl MobileSeed {
    /// Turn the seed into the spec handed to `CreateMobileEntity`.
    pub fn to_spec(&self) -> anyhow::Result<MobileSpec> {
        let mut segments: Vec<Vec<Step>> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            segments.push(
                segment
                    .iter()
                    .map(|id| step_for(id, self.stop_dwell_ticks))
                    .collect::<anyhow::Result<_>>()?,
            );
        }

        let route = match (self.kind, segments.len()) {
            (MobileKind::Bus | MobileKind::Tram, 1) => {
                let mut segments = segments;
                Route::single(segments.remove(0))?
            }
            (MobileKind::Pedestrian | MobileKind::Car, 3) => {
                let mut segments = segments;
                let house_to_work = segments.remove(0);
                let work_to_fun = segments.remove(0);
                let fun_to_home = segments.remove(0);
                Route::triple(house_to_work, work_to_fun, fun_to_home)?
            }
            (kind, n) => {
                anyhow::bail!("mobile {} ({kind:?}) has {n} segments", self.id)
            }
        };

        Ok(MobileSpec { kind: self.kind, route, rest_ticks: self.rest_ticks })
    }
}

/// Build the step for one entity ID, dispatching on its kind tag.
fn step_for(id: &EntityId, dwell_ticks: u32) -> anyhow::Result<Step> {
    let step = match id.kind() {
        EntityKind::Road               => Step::Road(id.clone()),
        EntityKind::Lane               => Step::Lane(id.clone()),
        EntityKind::Crossroad          => Step::Crossroad(id.clone()),
        EntityKind::PedestrianCrossing => Step::PedestrianCrossing(id.clone()),
        EntityKind::BusStop            => Step::BusStop { stop: id.clone(), dwell_ticks },
        EntityKind::TramStop           => Step::TramStop { stop: id.clone(), dwell_ticks },
        EntityKind::Zone               => Step::Zone(id.clone()),
        EntityKind::Mobile             => {
            anyhow::bail!("route step {id} is a mobile ID; steps must be static entities")
        }
    };
    Ok(step)
}
