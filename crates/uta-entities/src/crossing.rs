//! Pedestrian-crossing turn-taking.
//!
//! The crossing alternates between a vehicle phase (`vehicle_pass = true`)
//! and a pedestrian phase.  Requests for the off-phase side queue up; the
//! phase flips once the active crossers drain and the opposite queue is
//! non-empty.  An arrival on the off-phase side while the crossing is
//! completely idle flips immediately — nobody waits for traffic that isn't
//! there.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::warn;
use uta_core::EntityId;

use crate::behavior::Decision;
use crate::proto::{Command, CrossingCommand, Event, MobileCommand};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossingState {
    /// `true`: vehicles have the phase; `false`: pedestrians do.
    vehicle_pass: bool,
    pedestrian_requests: VecDeque<EntityId>,
    vehicle_requests:    VecDeque<EntityId>,
    /// Admitted crossers currently on the crossing (either side).
    crossing_now: BTreeSet<EntityId>,
}

impl Default for CrossingState {
    fn default() -> Self {
        Self {
            vehicle_pass:        true,
            pedestrian_requests: VecDeque::new(),
            vehicle_requests:    VecDeque::new(),
            crossing_now:        BTreeSet::new(),
        }
    }
}

impl CrossingState {
    pub fn decide(&self, crossing: &EntityId, cmd: &CrossingCommand) -> Decision {
        match cmd {
            CrossingCommand::RequestCross { walker } => {
                self.decide_request(crossing, walker, false)
            }
            CrossingCommand::RequestDrive { vehicle } => {
                self.decide_request(crossing, vehicle, true)
            }
            CrossingCommand::CrossingDone { id } => self.decide_done(crossing, id),
        }
    }

    /// `wants_vehicle_phase` is the phase the requester needs.
    fn decide_request(
        &self,
        crossing: &EntityId,
        id: &EntityId,
        wants_vehicle_phase: bool,
    ) -> Decision {
        let mut decision = Decision::none();
        if self.crossing_now.contains(id) {
            // Re-request after a lost grant.
            decision.send(
                id.clone(),
                Command::ToMobile(MobileCommand::ProceedGranted { from: crossing.clone() }),
            );
            return decision;
        }
        if self.queue_for(wants_vehicle_phase).contains(id) {
            return decision;
        }

        if self.vehicle_pass == wants_vehicle_phase {
            admit(crossing, id, &mut decision);
        } else if self.crossing_now.is_empty() && self.queue_for(self.vehicle_pass).is_empty() {
            // The active phase is idle: flip right away.
            decision.push_event(Event::CrossingPhaseFlipped { vehicle_pass: wants_vehicle_phase });
            admit(crossing, id, &mut decision);
        } else if wants_vehicle_phase {
            decision.push_event(Event::CrossingVehicleQueued { id: id.clone() });
        } else {
            decision.push_event(Event::CrossingPedestrianQueued { id: id.clone() });
        }
        decision
    }

    fn decide_done(&self, crossing: &EntityId, id: &EntityId) -> Decision {
        let mut decision = Decision::none();
        if !self.crossing_now.contains(id) {
            warn!(%crossing, %id, "crossing-done from an entity that was never admitted");
            return decision;
        }
        decision.push_event(Event::CrossingLeft { id: id.clone() });

        // Last one off the crossing: flip if the other side is waiting.
        if self.crossing_now.len() == 1 {
            let opposite = self.queue_for(!self.vehicle_pass);
            if !opposite.is_empty() {
                decision
                    .push_event(Event::CrossingPhaseFlipped { vehicle_pass: !self.vehicle_pass });
                // The whole waiting side crosses together.
                for waiting in opposite.iter().cloned().collect::<Vec<_>>() {
                    admit(crossing, &waiting, &mut decision);
                }
            }
        }
        decision
    }

    fn queue_for(&self, vehicle_phase: bool) -> &VecDeque<EntityId> {
        if vehicle_phase {
            &self.vehicle_requests
        } else {
            &self.pedestrian_requests
        }
    }

    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::CrossingPedestrianQueued { id } => {
                if !self.pedestrian_requests.contains(id) {
                    self.pedestrian_requests.push_back(id.clone());
                }
            }
            Event::CrossingVehicleQueued { id } => {
                if !self.vehicle_requests.contains(id) {
                    self.vehicle_requests.push_back(id.clone());
                }
            }
            Event::CrossingEntered { id } => {
                self.crossing_now.insert(id.clone());
                self.pedestrian_requests.retain(|queued| queued != id);
                self.vehicle_requests.retain(|queued| queued != id);
            }
            Event::CrossingLeft { id } => {
                self.crossing_now.remove(id);
            }
            Event::CrossingPhaseFlipped { vehicle_pass } => {
                self.vehicle_pass = *vehicle_pass;
            }
            _ => {}
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn vehicle_pass(&self) -> bool {
        self.vehicle_pass
    }

    pub fn active_crossers(&self) -> usize {
        self.crossing_now.len()
    }

    pub fn queued_pedestrians(&self) -> usize {
        self.pedestrian_requests.len()
    }

    pub fn queued_vehicles(&self) -> usize {
        self.vehicle_requests.len()
    }
}

fn admit(crossing: &EntityId, id: &EntityId, decision: &mut Decision) {
    decision.push_event(Event::CrossingEntered { id: id.clone() });
    decision.send(
        id.clone(),
        Command::ToMobile(MobileCommand::ProceedGranted { from: crossing.clone() }),
    );
}
