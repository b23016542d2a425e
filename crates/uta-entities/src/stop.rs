//! Bus/tram stop dwell protocol.
//!
//! A stop holds every arriving vehicle until its departure time.  Release
//! is driven by the time broadcast: each tick, vehicles whose `depart_at`
//! has passed are granted onward.  Tick handling is idempotent — a released
//! vehicle is no longer held, so the same tick observed twice releases
//! nobody new.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uta_core::{EntityId, TimeValue};

use crate::behavior::Decision;
use crate::proto::{Command, Event, MobileCommand, StopCommand};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StopState {
    /// `vehicle → departure time`.
    holding: BTreeMap<EntityId, TimeValue>,
}

impl StopState {
    pub fn decide(&self, _stop: &EntityId, cmd: &StopCommand, now: TimeValue) -> Decision {
        match cmd {
            StopCommand::Arrive { vehicle, dwell_ticks } => {
                if self.holding.contains_key(vehicle) {
                    return Decision::none();
                }
                Decision::event(Event::StopVehicleHeld {
                    vehicle:   vehicle.clone(),
                    depart_at: now.offset(u64::from(*dwell_ticks)),
                })
            }
        }
    }

    /// Release every held vehicle whose departure time has arrived.
    pub fn decide_tick(&self, stop: &EntityId, now: TimeValue) -> Decision {
        let mut decision = Decision::none();
        for (vehicle, depart_at) in &self.holding {
            if *depart_at <= now {
                decision.push_event(Event::StopVehicleReleased { vehicle: vehicle.clone() });
                decision.send(
                    vehicle.clone(),
                    Command::ToMobile(MobileCommand::ProceedGranted { from: stop.clone() }),
                );
            }
        }
        decision
    }

    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::StopVehicleHeld { vehicle, depart_at } => {
                self.holding.insert(vehicle.clone(), *depart_at);
            }
            Event::StopVehicleReleased { vehicle } => {
                self.holding.remove(vehicle);
            }
            _ => {}
        }
    }

    pub fn held(&self) -> usize {
        self.holding.len()
    }

    pub fn departure_of(&self, vehicle: &EntityId) -> Option<TimeValue> {
        self.holding.get(vehicle).copied()
    }
}
