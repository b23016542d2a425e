//! The `EntityBehavior` seam between the domain layer and the runtime.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uta_core::{EntityId, EntityKind, NodeName, TimeValue};
use uta_delivery::DedupFilter;

use crate::map::CityMap;
use crate::proto::{Command, Effect, Event};
use crate::{ImmovableState, MobileState};

// ── Decision ──────────────────────────────────────────────────────────────────

/// The output of one `decide` call: events to journal (in order) and
/// effects to run once all of them are durable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decision {
    pub events:  Vec<Event>,
    pub effects: Vec<Effect>,
}

impl Decision {
    pub fn none() -> Decision {
        Decision::default()
    }

    pub fn event(event: Event) -> Decision {
        Decision { events: vec![event], effects: vec![] }
    }

    pub fn push_event(&mut self, event: Event) -> &mut Self {
        self.events.push(event);
        self
    }

    pub fn push_effect(&mut self, effect: Effect) -> &mut Self {
        self.effects.push(effect);
        self
    }

    /// Shorthand for a reliable send effect.
    pub fn send(&mut self, to: EntityId, command: Command) -> &mut Self {
        self.effects.push(Effect::Send { to, command });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.effects.is_empty()
    }
}

// ── DecideCtx ─────────────────────────────────────────────────────────────────

/// Read-only services available to `decide`.
///
/// The map and node identity are process-wide values injected at entity
/// construction; handlers never reach for ambient globals.
pub struct DecideCtx<'a> {
    /// Latest observed broadcast time.
    pub now: TimeValue,
    /// The static map lookup service.
    pub map: &'a CityMap,
    /// Logical name of the hosting node.
    pub node: &'a NodeName,
    /// Listen address of the hosting node (`IpRequest` answers).
    pub node_addr: &'a str,
}

// ── EntityBehavior ────────────────────────────────────────────────────────────

/// A persistent entity's pure command/event state machine.
///
/// The contract mirrors strict persist-then-apply:
///
/// - [`decide`][Self::decide] reads state (`&self`) and returns a
///   [`Decision`]; it must not mutate anything.
/// - [`apply`][Self::apply] is the **only** mutator and must be total:
///   whatever event the journal holds, `apply` accepts.  Recovery replays
///   journaled events through the same `apply` with no `decide` involved.
/// - Domain-invariant violations inside `apply` are logged and absorbed,
///   never panicked on: a restart would only replay the same event.
pub trait EntityBehavior: Clone + Send + Serialize + DeserializeOwned + 'static {
    /// A fresh, empty state for `id`.
    fn empty(id: EntityId) -> Self;

    fn id(&self) -> &EntityId;

    fn dedup(&self) -> &DedupFilter;

    fn dedup_mut(&mut self) -> &mut DedupFilter;

    /// Record the latest broadcast time.  Ephemeral (not event-sourced):
    /// the tick stream re-establishes it after recovery.
    fn observe_time(&mut self, now: TimeValue);

    /// Handle one command from `from`, producing events and effects.
    fn decide(&self, from: &EntityId, command: &Command, ctx: &DecideCtx<'_>) -> Decision;

    /// Apply one journaled event to state.
    fn apply(&mut self, event: &Event);

    /// Bootstrap decision after recovery completes (before new commands are
    /// admitted).  Immovables respawn their children here.
    fn recovery_completed(&self) -> Decision;
}

// ── AnyEntity ─────────────────────────────────────────────────────────────────

/// The concrete entity state hosted by the runtime, dispatched by ID kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AnyEntity {
    Immovable(ImmovableState),
    Mobile(MobileState),
}

impl AnyEntity {
    /// The state shape matching `id`'s kind tag.
    pub fn for_id(id: EntityId) -> AnyEntity {
        if id.kind() == EntityKind::Mobile {
            AnyEntity::Mobile(MobileState::empty(id))
        } else {
            AnyEntity::Immovable(ImmovableState::empty(id))
        }
    }
}

impl EntityBehavior for AnyEntity {
    fn empty(id: EntityId) -> Self {
        AnyEntity::for_id(id)
    }

    fn id(&self) -> &EntityId {
        match self {
            AnyEntity::Immovable(s) => s.id(),
            AnyEntity::Mobile(s)    => s.id(),
        }
    }

    fn dedup(&self) -> &DedupFilter {
        match self {
            AnyEntity::Immovable(s) => s.dedup(),
            AnyEntity::Mobile(s)    => s.dedup(),
        }
    }

    fn dedup_mut(&mut self) -> &mut DedupFilter {
        match self {
            AnyEntity::Immovable(s) => s.dedup_mut(),
            AnyEntity::Mobile(s)    => s.dedup_mut(),
        }
    }

    fn observe_time(&mut self, now: TimeValue) {
        match self {
            AnyEntity::Immovable(s) => s.observe_time(now),
            AnyEntity::Mobile(s)    => s.observe_time(now),
        }
    }

    fn decide(&self, from: &EntityId, command: &Command, ctx: &DecideCtx<'_>) -> Decision {
        match self {
            AnyEntity::Immovable(s) => s.decide(from, command, ctx),
            AnyEntity::Mobile(s)    => s.decide(from, command, ctx),
        }
    }

    fn apply(&mut self, event: &Event) {
        match self {
            AnyEntity::Immovable(s) => s.apply(event),
            AnyEntity::Mobile(s)    => s.apply(event),
        }
    }

    fn recovery_completed(&self) -> Decision {
        match self {
            AnyEntity::Immovable(s) => s.recovery_completed(),
            AnyEntity::Mobile(s)    => s.recovery_completed(),
        }
    }
}
