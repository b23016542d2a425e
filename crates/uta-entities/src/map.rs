//! The city map document and its lookup service.
//!
//! The map is loaded once per process from a JSON document and injected
//! into every entity as an `Arc<CityMap>` — it is never reached through
//! ambient globals.  Records are immutable after load; entities copy the
//! record for their own ID into state when their `Identity` command arrives
//! (so the binding itself is journaled and replays without the map).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uta_core::{EntityId, EntityKind};

use crate::{EntityError, EntityResult};

// ── Position ──────────────────────────────────────────────────────────────────

/// A WGS-84 coordinate.  Single precision is ~1 m at the equator, enough
/// for drawing vehicles on a city map.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f32,
    pub lon: f32,
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadRecord {
    pub id: EntityId,
    /// Lanes composing this road, in driving order.
    pub lanes: Vec<EntityId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneRecord {
    pub id: EntityId,
    pub road: EntityId,
    /// Lane length in metres.
    pub length_m: f32,
    /// Geometry polyline; a vehicle traversing the lane visits these points
    /// in order, one per tick.
    pub points: Vec<Position>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossroadRecord {
    pub id: EntityId,
    /// Lanes feeding into the crossroad.
    pub lanes: Vec<EntityId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossingRecord {
    pub id: EntityId,
    pub road: EntityId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub id: EntityId,
    pub lane: EntityId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub id: EntityId,
    pub roads: Vec<EntityId>,
}

/// A borrowed view of whichever record matches a looked-up ID.
#[derive(Copy, Clone, Debug)]
pub enum MapRecord<'a> {
    Road(&'a RoadRecord),
    Lane(&'a LaneRecord),
    Crossroad(&'a CrossroadRecord),
    Crossing(&'a CrossingRecord),
    BusStop(&'a StopRecord),
    TramStop(&'a StopRecord),
    Zone(&'a ZoneRecord),
}

/// The owned copy of a record an immovable binds into its state when its
/// `Identity` command arrives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StaticData {
    Road(RoadRecord),
    Lane(LaneRecord),
    Crossroad(CrossroadRecord),
    Crossing(CrossingRecord),
    BusStop(StopRecord),
    TramStop(StopRecord),
    Zone(ZoneRecord),
}

impl<'a> MapRecord<'a> {
    /// Owned copy for embedding into an `IdentityArrived` event.
    pub fn to_static_data(self) -> StaticData {
        match self {
            MapRecord::Road(r)      => StaticData::Road(r.clone()),
            MapRecord::Lane(r)      => StaticData::Lane(r.clone()),
            MapRecord::Crossroad(r) => StaticData::Crossroad(r.clone()),
            MapRecord::Crossing(r)  => StaticData::Crossing(r.clone()),
            MapRecord::BusStop(r)   => StaticData::BusStop(r.clone()),
            MapRecord::TramStop(r)  => StaticData::TramStop(r.clone()),
            MapRecord::Zone(r)      => StaticData::Zone(r.clone()),
        }
    }
}

// ── Document ──────────────────────────────────────────────────────────────────

/// The JSON document shape, exactly as written by the map editor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapDocument {
    pub roads:                Vec<RoadRecord>,
    pub lanes:                Vec<LaneRecord>,
    pub crossroads:           Vec<CrossroadRecord>,
    pub pedestrian_crossings: Vec<CrossingRecord>,
    pub bus_stops:            Vec<StopRecord>,
    pub tram_stops:           Vec<StopRecord>,
    pub zones:                Vec<ZoneRecord>,
}

// ── CityMap ───────────────────────────────────────────────────────────────────

/// Indexed, validated map.  All lookups are by entity ID.
#[derive(Clone, Debug, Default)]
pub struct CityMap {
    roads:      HashMap<EntityId, RoadRecord>,
    lanes:      HashMap<EntityId, LaneRecord>,
    crossroads: HashMap<EntityId, CrossroadRecord>,
    crossings:  HashMap<EntityId, CrossingRecord>,
    bus_stops:  HashMap<EntityId, StopRecord>,
    tram_stops: HashMap<EntityId, StopRecord>,
    zones:      HashMap<EntityId, ZoneRecord>,
}

impl CityMap {
    /// An empty map.  Entities looked up against it stay unbound.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse and index a JSON map document.
    pub fn from_json(json: &str) -> EntityResult<Self> {
        Self::from_document(serde_json::from_str(json)?)
    }

    /// Index a parsed document, validating that every record sits in the
    /// section matching its ID's kind tag and that no ID repeats.
    pub fn from_document(doc: MapDocument) -> EntityResult<Self> {
        let mut map = Self::default();
        for r in doc.roads {
            insert_checked(&mut map.roads, r.id.clone(), EntityKind::Road, r)?;
        }
        for r in doc.lanes {
            insert_checked(&mut map.lanes, r.id.clone(), EntityKind::Lane, r)?;
        }
        for r in doc.crossroads {
            insert_checked(&mut map.crossroads, r.id.clone(), EntityKind::Crossroad, r)?;
        }
        for r in doc.pedestrian_crossings {
            insert_checked(&mut map.crossings, r.id.clone(), EntityKind::PedestrianCrossing, r)?;
        }
        for r in doc.bus_stops {
            insert_checked(&mut map.bus_stops, r.id.clone(), EntityKind::BusStop, r)?;
        }
        for r in doc.tram_stops {
            insert_checked(&mut map.tram_stops, r.id.clone(), EntityKind::TramStop, r)?;
        }
        for r in doc.zones {
            insert_checked(&mut map.zones, r.id.clone(), EntityKind::Zone, r)?;
        }
        Ok(map)
    }

    /// Look up the record for `id`, dispatching on its kind tag.
    pub fn record(&self, id: &EntityId) -> Option<MapRecord<'_>> {
        match id.kind() {
            EntityKind::Road               => self.roads.get(id).map(MapRecord::Road),
            EntityKind::Lane               => self.lanes.get(id).map(MapRecord::Lane),
            EntityKind::Crossroad          => self.crossroads.get(id).map(MapRecord::Crossroad),
            EntityKind::PedestrianCrossing => self.crossings.get(id).map(MapRecord::Crossing),
            EntityKind::BusStop            => self.bus_stops.get(id).map(MapRecord::BusStop),
            EntityKind::TramStop           => self.tram_stops.get(id).map(MapRecord::TramStop),
            EntityKind::Zone               => self.zones.get(id).map(MapRecord::Zone),
            EntityKind::Mobile             => None,
        }
    }

    /// Geometry polyline for a lane, used by mobiles to animate a step.
    pub fn lane_points(&self, id: &EntityId) -> Option<&[Position]> {
        self.lanes.get(id).map(|lane| lane.points.as_slice())
    }

    /// All immovable IDs, in stable order — the injector walks this to send
    /// every static entity its `Identity`.
    pub fn immovable_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .roads
            .keys()
            .chain(self.lanes.keys())
            .chain(self.crossroads.keys())
            .chain(self.crossings.keys())
            .chain(self.bus_stops.keys())
            .chain(self.tram_stops.keys())
            .chain(self.zones.keys())
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.immovable_ids().is_empty()
    }
}

fn insert_checked<R>(
    into: &mut HashMap<EntityId, R>,
    id:   EntityId,
    kind: EntityKind,
    record: R,
) -> EntityResult<()> {
    if id.kind() != kind {
        return Err(EntityError::MapKindMismatch {
            id:   id.to_string(),
            kind: id.kind().to_string(),
        });
    }
    if into.insert(id.clone(), record).is_some() {
        return Err(EntityError::DuplicateMapRecord(id.to_string()));
    }
    Ok(())
}
