//! Shared immovable-entity logic: identity binding, handled children,
//! sleepers, and delegation to the per-kind protocol.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uta_core::{EntityId, EntityKind, TimeValue};
use uta_delivery::DedupFilter;

use crate::behavior::{DecideCtx, Decision, EntityBehavior};
use crate::crossing::CrossingState;
use crate::crossroad::CrossroadState;
use crate::lane::LaneState;
use crate::map::StaticData;
use crate::proto::{Command, Effect, Event, MobileCommand};
use crate::stop::StopState;

// ── ProtocolState ─────────────────────────────────────────────────────────────

/// Per-kind protocol state.  Roads and zones are pass-through coordinators
/// and carry none.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProtocolState {
    Road,
    Lane(LaneState),
    Crossroad(CrossroadState),
    Crossing(CrossingState),
    Stop(StopState),
    Zone,
}

impl ProtocolState {
    fn for_kind(kind: EntityKind) -> ProtocolState {
        match kind {
            EntityKind::Lane               => ProtocolState::Lane(LaneState::default()),
            EntityKind::Crossroad          => ProtocolState::Crossroad(CrossroadState::default()),
            EntityKind::PedestrianCrossing => ProtocolState::Crossing(CrossingState::default()),
            EntityKind::BusStop | EntityKind::TramStop => ProtocolState::Stop(StopState::default()),
            EntityKind::Zone               => ProtocolState::Zone,
            // Road, and the unreachable Mobile arm.
            _                              => ProtocolState::Road,
        }
    }
}

// ── ImmovableState ────────────────────────────────────────────────────────────

/// State of one static map entity.
///
/// `handled` and `sleepers` are journaled through their events; the actual
/// child task handles are a runtime-local cache rebuilt by
/// `ReCreateMobileEntities` after recovery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImmovableState {
    id:       EntityId,
    bound:    Option<StaticData>,
    handled:  BTreeSet<EntityId>,
    sleepers: BTreeMap<EntityId, TimeValue>,
    protocol: ProtocolState,
    dedup:    DedupFilter,
    /// Latest observed broadcast time.  Re-established by the tick stream
    /// after recovery, not event-sourced.
    now: TimeValue,
}

impl ImmovableState {
    /// Commands that require the entity to be bound to its map record.
    fn needs_binding(command: &Command) -> bool {
        matches!(
            command,
            Command::CreateMobileEntity { .. }
                | Command::MobileEntityAdd { .. }
                | Command::MobileEntityRemove { .. }
                | Command::PauseExecution { .. }
                | Command::HandleLastVehicle
                | Command::ToLane(_)
                | Command::ToCrossroad(_)
                | Command::ToPedestrianCrossing(_)
                | Command::ToStop(_)
        )
    }

    fn decide_identity(&self, id: &EntityId, ctx: &DecideCtx<'_>) -> Decision {
        if self.bound.is_some() {
            debug!(entity = %self.id, "identity re-delivered to a bound entity");
            return Decision::none();
        }
        if *id != self.id {
            warn!(entity = %self.id, %id, "identity command addressed to the wrong entity");
            return Decision::none();
        }
        match ctx.map.record(id) {
            Some(record) => Decision::event(Event::IdentityArrived {
                id:   id.clone(),
                data: record.to_static_data(),
            }),
            None => {
                // Fail-slow: stay unbound, keep ignoring domain traffic.
                error!(entity = %self.id, "no map record for this entity ID");
                Decision::none()
            }
        }
    }

    fn respawn_effects(&self, id: &EntityId, decision: &mut Decision) {
        decision.push_effect(Effect::SpawnMobile { id: id.clone() });
        decision.send(id.clone(), Command::ResumeExecution);
    }

    fn decide_tick(&self, now: TimeValue) -> Decision {
        let mut decision = Decision::none();

        // Wake sleepers whose time has come.  Idempotent: waking removes
        // them from the map, so a replayed tick wakes nobody new.
        for (id, wake_at) in &self.sleepers {
            if *wake_at <= now {
                decision.push_event(Event::MobileEntityWakingUp { id: id.clone() });
                self.respawn_effects(id, &mut decision);
            }
        }

        if let ProtocolState::Stop(stop) = &self.protocol {
            let stop_decision = stop.decide_tick(&self.id, now);
            decision.events.extend(stop_decision.events);
            decision.effects.extend(stop_decision.effects);
        }
        decision
    }
}

impl EntityBehavior for ImmovableState {
    fn empty(id: EntityId) -> Self {
        let protocol = ProtocolState::for_kind(id.kind());
        Self {
            id,
            bound: None,
            handled: BTreeSet::new(),
            sleepers: BTreeMap::new(),
            protocol,
            dedup: DedupFilter::new(),
            now: TimeValue::ZERO,
        }
    }

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn dedup(&self) -> &DedupFilter {
        &self.dedup
    }

    fn dedup_mut(&mut self) -> &mut DedupFilter {
        &mut self.dedup
    }

    fn observe_time(&mut self, now: TimeValue) {
        if now > self.now {
            self.now = now;
        }
    }

    fn decide(&self, from: &EntityId, command: &Command, ctx: &DecideCtx<'_>) -> Decision {
        if self.bound.is_none() && Self::needs_binding(command) {
            warn!(entity = %self.id, ?command, "domain command before identity; ignored");
            return Decision::none();
        }

        match command {
            Command::Identity { id } => self.decide_identity(id, ctx),

            Command::CreateMobileEntity { id, spec } => {
                let mut decision = Decision::none();
                if !self.handled.contains(id) {
                    decision.push_event(Event::MobileEntityArrived { id: id.clone() });
                }
                decision.push_effect(Effect::SpawnMobile { id: id.clone() });
                decision.send(
                    id.clone(),
                    Command::ToMobile(MobileCommand::AssignRoute { spec: spec.clone() }),
                );
                decision.send(id.clone(), Command::ResumeExecution);
                decision
            }

            Command::ReCreateMobileEntities => {
                let mut decision = Decision::none();
                for id in &self.handled {
                    if !self.sleepers.contains_key(id) {
                        self.respawn_effects(id, &mut decision);
                    }
                }
                decision
            }

            Command::ReCreateMe { id } => {
                let mut decision = Decision::none();
                if self.handled.contains(id) {
                    self.respawn_effects(id, &mut decision);
                } else {
                    warn!(entity = %self.id, %id, "asked to recreate a mobile this entity never handled");
                }
                decision
            }

            Command::MobileEntityAdd { id } => {
                if self.handled.contains(id) {
                    Decision::none()
                } else {
                    Decision::event(Event::MobileEntityArrived { id: id.clone() })
                }
            }

            Command::MobileEntityRemove { id } => {
                if !self.handled.contains(id) {
                    debug!(entity = %self.id, %id, "removal of an unhandled mobile; ignored");
                    return Decision::none();
                }
                let mut decision = Decision::event(Event::MobileEntityGone { id: id.clone() });
                // Lanes additionally free the departing vehicle's slot and
                // may admit the queue head.
                if let ProtocolState::Lane(lane) = &self.protocol {
                    let lane_decision = lane.decide(
                        &self.id,
                        &crate::proto::LaneCommand::VehicleLeft { vehicle: id.clone() },
                    );
                    decision.events.extend(lane_decision.events);
                    decision.effects.extend(lane_decision.effects);
                }
                decision
            }

            Command::PauseExecution { wake_at } => {
                let mut decision = Decision::none();
                // A child that wandered off this entity's own step re-enters
                // the handled table when it comes home to sleep, so restarts
                // respawn it from here.
                if !self.handled.contains(from) {
                    decision.push_event(Event::MobileEntityArrived { id: from.clone() });
                }
                decision.push_event(Event::MobileEntitySleeping {
                    id:      from.clone(),
                    wake_at: *wake_at,
                });
                decision.send(
                    from.clone(),
                    Command::ToMobile(MobileCommand::SleepApproved { wake_at: *wake_at }),
                );
                decision
            }

            Command::HandleLastVehicle => match &self.protocol {
                ProtocolState::Lane(lane) => lane.decide_last_vehicle(&self.id, from),
                _ => {
                    warn!(entity = %self.id, "HandleLastVehicle sent to a non-lane; ignored");
                    Decision::none()
                }
            },

            Command::MovableActorRequest { id } => {
                let host = self.handled.contains(id).then(|| ctx.node.clone());
                let mut decision = Decision::none();
                decision.send(
                    from.clone(),
                    Command::MovableActorResponse { id: id.clone(), host },
                );
                decision
            }

            Command::IpRequest => {
                let mut decision = Decision::none();
                decision.send(
                    from.clone(),
                    Command::IpResponse { addr: ctx.node_addr.to_owned() },
                );
                decision
            }

            Command::MovableActorResponse { id, host } => {
                debug!(entity = %self.id, mobile = %id, ?host, "movable-actor lookup answer");
                Decision::none()
            }

            Command::IpResponse { addr } => {
                debug!(entity = %self.id, addr, "ip lookup answer");
                Decision::none()
            }

            Command::Time { now } => self.decide_tick(*now),

            Command::ToLane(cmd) => match &self.protocol {
                ProtocolState::Lane(lane) => lane.decide(&self.id, cmd),
                _ => unexpected(&self.id, command),
            },

            Command::ToCrossroad(cmd) => match &self.protocol {
                ProtocolState::Crossroad(crossroad) => crossroad.decide(&self.id, cmd),
                _ => unexpected(&self.id, command),
            },

            Command::ToPedestrianCrossing(cmd) => match &self.protocol {
                ProtocolState::Crossing(crossing) => crossing.decide(&self.id, cmd),
                _ => unexpected(&self.id, command),
            },

            Command::ToStop(cmd) => match &self.protocol {
                ProtocolState::Stop(stop) => stop.decide(&self.id, cmd, self.now),
                _ => unexpected(&self.id, command),
            },

            Command::ToMobile(_) | Command::ResumeExecution => unexpected(&self.id, command),
        }
    }

    fn apply(&mut self, event: &Event) {
        match event {
            Event::IdentityArrived { data, .. } => {
                self.bound = Some(data.clone());
            }
            Event::NoDuplicate { sender, delivery_id } => {
                self.dedup.record(sender, *delivery_id);
            }
            Event::MobileEntityArrived { id } => {
                self.handled.insert(id.clone());
            }
            Event::MobileEntityGone { id } => {
                // Lane slot bookkeeping has its own LaneSlotFreed event.
                self.handled.remove(id);
                self.sleepers.remove(id);
            }
            Event::MobileEntitySleeping { id, wake_at } => {
                self.sleepers.insert(id.clone(), *wake_at);
            }
            Event::MobileEntityWakingUp { id } => {
                self.sleepers.remove(id);
            }
            // Sender-side delivery events are consumed by the runtime.
            Event::OutboundRecorded { .. } | Event::OutboundConfirmed { .. } => {}
            other => match &mut self.protocol {
                ProtocolState::Lane(lane)           => lane.apply(other),
                ProtocolState::Crossroad(crossroad) => crossroad.apply(other),
                ProtocolState::Crossing(crossing)   => crossing.apply(other),
                ProtocolState::Stop(stop)           => stop.apply(other),
                ProtocolState::Road | ProtocolState::Zone => {}
            },
        }
    }

    fn recovery_completed(&self) -> Decision {
        // Self-addressed so it lands *after* any buffered removals queued
        // during recovery; the runtime loops it back without delivery
        // tracking (a self-send has nobody else to ack it).
        let mut decision = Decision::none();
        if !self.handled.is_empty() {
            decision.send(self.id.clone(), Command::ReCreateMobileEntities);
        }
        decision
    }
}

impl ImmovableState {
    // ── Accessors (tests, introspection) ──────────────────────────────────

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn handled(&self) -> &BTreeSet<EntityId> {
        &self.handled
    }

    pub fn sleepers(&self) -> &BTreeMap<EntityId, TimeValue> {
        &self.sleepers
    }

    pub fn protocol(&self) -> &ProtocolState {
        &self.protocol
    }
}

fn unexpected(entity: &EntityId, command: &Command) -> Decision {
    // The original operators' words: we should not be here.
    warn!(%entity, ?command, "we should not be here: command does not match entity kind");
    Decision::none()
}
