//! The wire protocol: commands, journaled events, envelopes and effects.
//!
//! # Reliability framing
//!
//! Entity-to-entity traffic always travels as `Message::Request` carrying a
//! sender-assigned `DeliveryId`, answered by `Message::Ack`.  The injector
//! and the time broadcaster are non-persistent senders and use
//! `Message::Tell`, which is neither acknowledged nor deduplicated (time
//! ticks are idempotent by construction).
//!
//! # Events
//!
//! `Event` is the single journaled alphabet for every entity kind.  Events
//! are immutable once journaled; new variants may be added at the end but
//! existing ones never change shape (additive evolution only).

use serde::{Deserialize, Serialize};
use uta_core::{DeliveryId, EntityId, NodeName, TimeValue};
use uta_delivery::PendingSend;
use uta_route::SegmentTag;

use crate::map::{Position, StaticData};
use crate::mobile::MobileSpec;

// ── Per-kind command sets ─────────────────────────────────────────────────────

/// Commands understood by lanes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LaneCommand {
    /// A vehicle asks to enter the lane.  Admission is granted in arrival
    /// order, one vehicle per free slot.
    RequestAdmission { vehicle: EntityId },
    /// A vehicle reports that it has fully left the lane, freeing the slot
    /// behind its former predecessor.
    VehicleLeft { vehicle: EntityId },
}

/// Commands understood by crossroads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CrossroadCommand {
    /// A vehicle asks for the mutual-exclusion token.
    RequestToken { vehicle: EntityId },
    /// The current holder returns the token.
    ReleaseToken { vehicle: EntityId },
}

/// Commands understood by pedestrian crossings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CrossingCommand {
    /// A pedestrian asks to cross.
    RequestCross { walker: EntityId },
    /// A vehicle asks to drive over the crossing.
    RequestDrive { vehicle: EntityId },
    /// An admitted crosser (either side) reports it is clear.
    CrossingDone { id: EntityId },
}

/// Commands understood by bus and tram stops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StopCommand {
    /// A vehicle arrives and will dwell for `dwell_ticks` before the stop
    /// releases it.
    Arrive { vehicle: EntityId, dwell_ticks: u32 },
}

/// Commands understood by mobiles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MobileCommand {
    /// The creating immovable delivers the route (and implicitly starts
    /// traversal — robust against a lost `ResumeExecution`).
    AssignRoute { spec: MobileSpec },
    /// A static entity admits this mobile into the step it guards.
    ProceedGranted { from: EntityId },
    /// The vehicle ahead has left the current lane.
    PredecessorGone,
    /// The lane names the vehicle ahead of this one (`None`: lane was empty).
    PredecessorIs { id: Option<EntityId> },
    /// The lane names the vehicle that entered behind this one.
    SuccessorIs { id: EntityId },
    /// The host immovable confirms a `PauseExecution` request; the mobile
    /// journals its pause and stops locally.
    SleepApproved { wake_at: TimeValue },
}

// ── Command ───────────────────────────────────────────────────────────────────

/// Everything an entity can be asked to do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    // ── Injector (non-persistent sender) ──────────────────────────────────
    /// Bind this immovable to its map record.
    Identity { id: EntityId },
    /// Spawn a mobile child, deliver its route, and start it.
    CreateMobileEntity { id: EntityId, spec: MobileSpec },

    // ── Lifecycle ─────────────────────────────────────────────────────────
    /// Self-addressed after recovery: respawn every handled child.
    ReCreateMobileEntities,
    /// Respawn one specific child.
    ReCreateMe { id: EntityId },
    /// A mobile entered the step this immovable guards.
    MobileEntityAdd { id: EntityId },
    /// A mobile left the step this immovable guards.
    MobileEntityRemove { id: EntityId },
    /// A mobile asks its host to register it as sleeping until `wake_at`.
    PauseExecution { wake_at: TimeValue },
    /// Start (or restart) a mobile's traversal.
    ResumeExecution,
    /// The sending vehicle has fully passed the lane entry; clear the
    /// "last vehicle entered" pointer if it still names the sender.
    HandleLastVehicle,

    // ── Cluster introspection ─────────────────────────────────────────────
    /// Which node hosts mobile `id`?  Answered from the handled-children
    /// table of the receiving immovable.
    MovableActorRequest { id: EntityId },
    MovableActorResponse { id: EntityId, host: Option<NodeName> },
    /// What address does the receiving entity's node listen on?
    IpRequest,
    IpResponse { addr: String },

    // ── Time ──────────────────────────────────────────────────────────────
    /// A tick from the `timeMessage` broadcast topic.
    Time { now: TimeValue },

    // ── Per-kind envelopes ────────────────────────────────────────────────
    ToLane(LaneCommand),
    ToCrossroad(CrossroadCommand),
    ToPedestrianCrossing(CrossingCommand),
    ToStop(StopCommand),
    ToMobile(MobileCommand),
}

// ── Message / Envelope ────────────────────────────────────────────────────────

/// The reliability framing around a command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Reliable delivery: retried by the sender until acknowledged.
    Request { delivery_id: DeliveryId, command: Command },
    /// Acknowledges receipt (not processing) of `Request { delivery_id }`.
    Ack { delivery_id: DeliveryId },
    /// Unreliable one-shot from a non-persistent sender.
    Tell { command: Command },
}

/// One routed unit: who sent what to whom.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from:    EntityId,
    pub to:      EntityId,
    pub message: Message,
}

// ── Event ─────────────────────────────────────────────────────────────────────

/// The journaled event alphabet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // ── Runtime / reliability ─────────────────────────────────────────────
    /// The entity bound itself to its map record.
    IdentityArrived { id: EntityId, data: StaticData },
    /// `(sender, delivery_id)` was accepted as new; the dedup mark rises.
    NoDuplicate { sender: EntityId, delivery_id: DeliveryId },
    /// A reliable outbound send was recorded (at-least-once sender side).
    OutboundRecorded { send: PendingSend<Command> },
    /// The matching ack arrived; the send stops retrying.
    OutboundConfirmed { delivery_id: DeliveryId },

    // ── Children / sleepers (immovables) ──────────────────────────────────
    MobileEntityArrived { id: EntityId },
    MobileEntityGone { id: EntityId },
    MobileEntitySleeping { id: EntityId, wake_at: TimeValue },
    MobileEntityWakingUp { id: EntityId },

    // ── Lane protocol ─────────────────────────────────────────────────────
    LaneAdmissionAccepted { vehicle: EntityId, predecessor: Option<EntityId> },
    LaneVehicleQueued { vehicle: EntityId },
    LaneSlotFreed { vehicle: EntityId },
    LaneLastVehicleCleared { vehicle: EntityId },

    // ── Crossroad protocol ────────────────────────────────────────────────
    CrossroadTokenGranted { to: EntityId },
    CrossroadTokenReleased { from: EntityId },
    CrossroadQueued { vehicle: EntityId },

    // ── Pedestrian-crossing protocol ──────────────────────────────────────
    CrossingPedestrianQueued { id: EntityId },
    CrossingVehicleQueued { id: EntityId },
    CrossingEntered { id: EntityId },
    CrossingLeft { id: EntityId },
    CrossingPhaseFlipped { vehicle_pass: bool },

    // ── Stop protocol ─────────────────────────────────────────────────────
    StopVehicleHeld { vehicle: EntityId, depart_at: TimeValue },
    StopVehicleReleased { vehicle: EntityId },

    // ── Mobile ────────────────────────────────────────────────────────────
    RouteAssigned { spec: MobileSpec, host: EntityId },
    /// A grant request went out; don't ask again until the answer arrives.
    /// `advance` records what the grant means: `true` moves the cursor
    /// forward (next step, stop departure, sleep approval), `false` admits
    /// the mobile into the step the cursor already points at.
    GrantRequested { of: EntityId, advance: bool },
    StepAdvanced { wrapped_to: Option<SegmentTag> },
    MotionLoaded { points: Vec<Position> },
    MotionAdvanced { point_index: usize },
    NextVehicleChanged { id: Option<EntityId> },
    PreviousVehicleChanged { id: Option<EntityId> },
    PredecessorGoneSent { to: EntityId },
    MobilePaused { wake_at: TimeValue },
    MobileResumed,
}

// ── Effect ────────────────────────────────────────────────────────────────────

/// Outbound side-effects produced by `decide`, executed by the runtime only
/// after the decision's events are durable — and skipped entirely during
/// recovery replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Reliable send: tracked, retried until acknowledged.
    Send { to: EntityId, command: Command },
    /// Spawn (or revive) a mobile child on the local node.
    SpawnMobile { id: EntityId },
    /// The entity's task terminates after this decision (mobile pause).
    StopSelf,
}

// ── VizEvent ──────────────────────────────────────────────────────────────────

/// One JSON message on the visualization WebSocket: which entity applied
/// which event at what time.  Lossy for slow clients by design.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VizEvent {
    pub entity: EntityId,
    pub at:     TimeValue,
    pub event:  Event,
}
