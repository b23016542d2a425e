//! The `Step` waypoint type.

use serde::{Deserialize, Serialize};
use uta_core::{EntityId, EntityKind};

use crate::RouteError;

/// One kind-tagged waypoint in a route.
///
/// Steps reference the static entity they traverse **by ID**, never by
/// actor handle — routes live inside snapshots, and handles don't persist.
/// Stop steps carry how many ticks the vehicle dwells before it may ask to
/// depart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Road(EntityId),
    Lane(EntityId),
    Crossroad(EntityId),
    PedestrianCrossing(EntityId),
    BusStop { stop: EntityId, dwell_ticks: u32 },
    TramStop { stop: EntityId, dwell_ticks: u32 },
    Zone(EntityId),
}

impl Step {
    /// The static entity this step traverses.
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Step::Road(id)
            | Step::Lane(id)
            | Step::Crossroad(id)
            | Step::PedestrianCrossing(id)
            | Step::Zone(id) => id,
            Step::BusStop { stop, .. } | Step::TramStop { stop, .. } => stop,
        }
    }

    /// The entity kind this step variant requires.
    pub fn required_kind(&self) -> EntityKind {
        match self {
            Step::Road(_)               => EntityKind::Road,
            Step::Lane(_)               => EntityKind::Lane,
            Step::Crossroad(_)          => EntityKind::Crossroad,
            Step::PedestrianCrossing(_) => EntityKind::PedestrianCrossing,
            Step::BusStop { .. }        => EntityKind::BusStop,
            Step::TramStop { .. }       => EntityKind::TramStop,
            Step::Zone(_)               => EntityKind::Zone,
        }
    }

    /// Dwell duration for stop steps, `None` otherwise.
    pub fn dwell_ticks(&self) -> Option<u32> {
        match self {
            Step::BusStop { dwell_ticks, .. } | Step::TramStop { dwell_ticks, .. } => {
                Some(*dwell_ticks)
            }
            _ => None,
        }
    }

    /// Check that the embedded ID's kind tag matches the step variant.
    pub fn validate(&self) -> Result<(), RouteError> {
        let actual = self.entity_id().kind();
        let expected = self.required_kind();
        if actual == expected {
            Ok(())
        } else {
            Err(RouteError::StepKindMismatch {
                id:       self.entity_id().to_string(),
                expected: expected.as_str(),
                actual:   actual.to_string(),
            })
        }
    }
}
