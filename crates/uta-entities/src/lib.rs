//! `uta-entities` — the domain layer of the traffic network.
//!
//! Everything in this crate is a **pure state machine**: a `decide` step
//! that reads state and produces events plus outbound effects, and an
//! `apply` step that is the *only* mutator of state.  The runtime crate
//! journals every event between the two, which is what makes crash recovery
//! a straight replay: `apply` runs again, `decide` does not.
//!
//! # Crate layout
//!
//! | Module        | Contents                                             |
//! |---------------|------------------------------------------------------|
//! | [`map`]       | The city map document and the `CityMap` lookup       |
//! | [`proto`]     | `Command`, `Event`, `Message`, `Envelope`, `Effect`  |
//! | [`behavior`]  | `EntityBehavior` trait, `Decision`, `AnyEntity`      |
//! | [`immovable`] | Shared immovable logic (identity, children, sleepers)|
//! | [`lane`]      | Lane admission protocol                              |
//! | [`crossroad`] | Crossroad token arbiter                              |
//! | [`crossing`]  | Pedestrian-crossing turn-taking                      |
//! | [`stop`]      | Bus/tram stop dwell protocol                         |
//! | [`mobile`]    | Mobile stepping, neighbors, pause/resume             |
//! | [`error`]     | `EntityError`, `EntityResult<T>`                     |

pub mod behavior;
pub mod crossing;
pub mod crossroad;
pub mod error;
pub mod immovable;
pub mod lane;
pub mod map;
pub mod mobile;
pub mod proto;
pub mod stop;


pub use behavior::{AnyEntity, DecideCtx, Decision, EntityBehavior};
pub use error::{EntityError, EntityResult};
pub use immovable::ImmovableState;
pub use map::{CityMap, MapRecord, Position, StaticData};
pub use mobile::{MobileKind, MobileSpec, MobileState};
pub use proto::{
    Command, CrossingCommand, CrossroadCommand, Effect, Envelope, Event, LaneCommand, Message,
    MobileCommand, StopCommand, VizEvent,
};
