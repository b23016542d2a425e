//! Crossroad token arbiter.
//!
//! At most one vehicle holds the crossing token at a time.  Requests while
//! the token is out are queued in arrival order; releasing the token hands
//! it straight to the queue head.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uta_core::EntityId;

use crate::behavior::Decision;
use crate::proto::{Command, CrossroadCommand, Event, MobileCommand};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossroadState {
    holder: Option<EntityId>,
    queue:  VecDeque<EntityId>,
}

impl CrossroadState {
    pub fn decide(&self, crossroad: &EntityId, cmd: &CrossroadCommand) -> Decision {
        match cmd {
            CrossroadCommand::RequestToken { vehicle } => self.decide_request(crossroad, vehicle),
            CrossroadCommand::ReleaseToken { vehicle } => self.decide_release(crossroad, vehicle),
        }
    }

    fn decide_request(&self, crossroad: &EntityId, vehicle: &EntityId) -> Decision {
        let mut decision = Decision::none();
        match &self.holder {
            None => {
                grant(crossroad, vehicle, &mut decision);
            }
            Some(holder) if holder == vehicle => {
                // Re-request after a lost grant: repeat it, change nothing.
                decision.send(
                    vehicle.clone(),
                    Command::ToMobile(MobileCommand::ProceedGranted { from: crossroad.clone() }),
                );
            }
            Some(_) if !self.queue.contains(vehicle) => {
                decision.push_event(Event::CrossroadQueued { vehicle: vehicle.clone() });
            }
            Some(_) => {}
        }
        decision
    }

    fn decide_release(&self, crossroad: &EntityId, vehicle: &EntityId) -> Decision {
        let mut decision = Decision::none();
        if self.holder.as_ref() != Some(vehicle) {
            warn!(%crossroad, %vehicle, "token release from a vehicle that does not hold it");
            return decision;
        }
        decision.push_event(Event::CrossroadTokenReleased { from: vehicle.clone() });
        if let Some(next) = self.queue.front() {
            grant(crossroad, next, &mut decision);
        }
        decision
    }

    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::CrossroadTokenGranted { to } => {
                self.holder = Some(to.clone());
                self.queue.retain(|queued| queued != to);
            }
            Event::CrossroadTokenReleased { .. } => {
                self.holder = None;
            }
            Event::CrossroadQueued { vehicle } => {
                if !self.queue.contains(vehicle) {
                    self.queue.push_back(vehicle.clone());
                }
            }
            _ => {}
        }
    }

    pub fn holder(&self) -> Option<&EntityId> {
        self.holder.as_ref()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

fn grant(crossroad: &EntityId, vehicle: &EntityId, decision: &mut Decision) {
    decision.push_event(Event::CrossroadTokenGranted { to: vehicle.clone() });
    decision.send(
        vehicle.clone(),
        Command::ToMobile(MobileCommand::ProceedGranted { from: crossroad.clone() }),
    );
}
