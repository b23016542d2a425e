//! Lane admission protocol.
//!
//! Admission is governed by the lane's **entry zone**: `last_entered` names
//! the vehicle currently occupying it, and no one else is admitted until
//! that vehicle reports past the zone (`HandleLastVehicle`) or leaves the
//! lane outright.  Requests that arrive while the zone is occupied queue in
//! arrival order.
//!
//! Independently, the lane maintains `vehicle_free` — for each vehicle
//! still on the lane, whether the slot directly behind it is free — and
//! `pred_of`, who drives directly ahead of whom.  Together they let the
//! lane hand every newly admitted vehicle its predecessor link and tell the
//! predecessor about its new follower.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uta_core::EntityId;

use crate::behavior::Decision;
use crate::proto::{Command, Effect, Event, LaneCommand, MobileCommand};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneState {
    /// `vehicle → is the slot behind it free?`
    vehicle_free: BTreeMap<EntityId, bool>,
    /// `vehicle → the vehicle directly ahead of it on this lane`.
    pred_of: BTreeMap<EntityId, EntityId>,
    /// The vehicle occupying the entry zone.  Cleared by
    /// `HandleLastVehicle` once that vehicle has passed it.
    last_entered: Option<EntityId>,
    /// The most recently admitted vehicle still on the lane — the
    /// predecessor handed to the next admission.
    newest: Option<EntityId>,
    /// Vehicles waiting for admission, in arrival order.
    queue: VecDeque<EntityId>,
}

impl LaneState {
    /// `true` when the entry zone is clear.
    fn entry_free(&self) -> bool {
        self.last_entered.is_none()
    }

    fn is_admitted(&self, vehicle: &EntityId) -> bool {
        self.vehicle_free.contains_key(vehicle)
    }

    // ── decide ────────────────────────────────────────────────────────────

    pub fn decide(&self, lane: &EntityId, cmd: &LaneCommand) -> Decision {
        match cmd {
            LaneCommand::RequestAdmission { vehicle } => self.decide_admission(lane, vehicle),
            LaneCommand::VehicleLeft { vehicle }      => self.decide_left(lane, vehicle),
        }
    }

    fn decide_admission(&self, lane: &EntityId, vehicle: &EntityId) -> Decision {
        let mut decision = Decision::none();

        if self.is_admitted(vehicle) {
            // A re-request after a lost grant: repeat the grant, change nothing.
            debug!(%lane, %vehicle, "re-granting already admitted vehicle");
            decision.send(
                vehicle.clone(),
                Command::ToMobile(MobileCommand::ProceedGranted { from: lane.clone() }),
            );
            return decision;
        }
        if self.queue.contains(vehicle) {
            return decision;
        }

        if self.queue.is_empty() && self.entry_free() {
            self.admit(lane, vehicle, &mut decision);
        } else {
            decision.push_event(Event::LaneVehicleQueued { vehicle: vehicle.clone() });
        }
        decision
    }

    fn decide_left(&self, lane: &EntityId, vehicle: &EntityId) -> Decision {
        let mut decision = Decision::none();
        if !self.is_admitted(vehicle) {
            warn!(%lane, %vehicle, "departure report from a vehicle this lane never admitted");
            return decision;
        }
        decision.push_event(Event::LaneSlotFreed { vehicle: vehicle.clone() });
        self.admit_head_after(&decision, lane)
    }

    /// Clear the entry zone once `vehicle` has passed it; this may admit
    /// the queue head.
    pub fn decide_last_vehicle(&self, lane: &EntityId, vehicle: &EntityId) -> Decision {
        let mut decision = Decision::none();
        if self.last_entered.as_ref() != Some(vehicle) {
            return decision;
        }
        decision.push_event(Event::LaneLastVehicleCleared { vehicle: vehicle.clone() });
        self.admit_head_after(&decision, lane)
    }

    /// Extend `decision` with an admission of the queue head if, after the
    /// already-decided events, the entry zone is clear.
    fn admit_head_after(&self, decision: &Decision, lane: &EntityId) -> Decision {
        let mut decision = decision.clone();
        let mut post = self.clone();
        for event in &decision.events {
            post.apply(event);
        }
        if let Some(head) = post.queue.front().cloned() {
            if post.entry_free() {
                post.admit(lane, &head, &mut decision);
            }
        }
        decision
    }

    /// Append the admission event and the grant + neighbor notifications
    /// for `vehicle` entering behind the current newest vehicle.
    fn admit(&self, lane: &EntityId, vehicle: &EntityId, decision: &mut Decision) {
        let predecessor = self.newest.clone();
        decision.push_event(Event::LaneAdmissionAccepted {
            vehicle:     vehicle.clone(),
            predecessor: predecessor.clone(),
        });
        decision.send(
            vehicle.clone(),
            Command::ToMobile(MobileCommand::ProceedGranted { from: lane.clone() }),
        );
        decision.send(
            vehicle.clone(),
            Command::ToMobile(MobileCommand::PredecessorIs { id: predecessor.clone() }),
        );
        if let Some(pred) = predecessor {
            decision.push_effect(Effect::Send {
                to:      pred,
                command: Command::ToMobile(MobileCommand::SuccessorIs { id: vehicle.clone() }),
            });
        }
    }

    // ── apply ─────────────────────────────────────────────────────────────

    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::LaneAdmissionAccepted { vehicle, predecessor } => {
                if let Some(pred) = predecessor {
                    self.vehicle_free.insert(pred.clone(), false);
                    self.pred_of.insert(vehicle.clone(), pred.clone());
                }
                self.vehicle_free.insert(vehicle.clone(), true);
                self.last_entered = Some(vehicle.clone());
                self.newest = Some(vehicle.clone());
                self.queue.retain(|queued| queued != vehicle);
            }
            Event::LaneVehicleQueued { vehicle } => {
                if !self.queue.contains(vehicle) {
                    self.queue.push_back(vehicle.clone());
                }
            }
            Event::LaneSlotFreed { vehicle } => {
                let grand_pred = self.pred_of.remove(vehicle);
                self.vehicle_free.remove(vehicle);
                // Vehicles that followed the departed one now follow its
                // former predecessor (or lead the lane).
                let followers: Vec<EntityId> = self
                    .pred_of
                    .iter()
                    .filter(|(_, pred)| *pred == vehicle)
                    .map(|(follower, _)| follower.clone())
                    .collect();
                if let Some(pred) = &grand_pred {
                    // The gap behind the grand-predecessor closes again if a
                    // follower moves up into it.
                    self.vehicle_free.insert(pred.clone(), followers.is_empty());
                }
                for follower in followers {
                    match &grand_pred {
                        Some(pred) => {
                            self.pred_of.insert(follower, pred.clone());
                        }
                        None => {
                            self.pred_of.remove(&follower);
                        }
                    }
                }
                if self.last_entered.as_ref() == Some(vehicle) {
                    self.last_entered = None;
                }
                if self.newest.as_ref() == Some(vehicle) {
                    self.newest = grand_pred;
                }
            }
            Event::LaneLastVehicleCleared { vehicle } => {
                if self.last_entered.as_ref() == Some(vehicle) {
                    self.last_entered = None;
                }
                self.vehicle_free.insert(vehicle.clone(), true);
            }
            _ => {}
        }
    }

    // ── Accessors (tests, introspection) ──────────────────────────────────

    pub fn slot_behind_is_free(&self, vehicle: &EntityId) -> Option<bool> {
        self.vehicle_free.get(vehicle).copied()
    }

    pub fn last_entered(&self) -> Option<&EntityId> {
        self.last_entered.as_ref()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
