//! Mobile-entity logic: stepping, neighbors, pause/resume.
//!
//! # Stepping state machine
//!
//! A mobile is always in exactly one of these situations:
//!
//! - **Entering**: it has a cursor position but has not entered the step
//!   yet (fresh route, or just woken from a day-cycle pause).  Arbitrated
//!   steps need a grant first; pass-through steps are entered directly.
//! - **Moving**: inside the current step, advancing one geometry point per
//!   tick until the point sequence is exhausted.
//! - **Awaiting a grant**: asked the next step's guardian (or, at a stop,
//!   the stop it dwells at; or, at a segment end, its host) and does
//!   nothing until the answer arrives.  The pending target is journaled so
//!   a recovered mobile knows it must not ask twice.
//!
//! Leaving a step always notifies the step's entity (`MobileEntityRemove`),
//! returns a crossroad token or reports a crossing clear where applicable,
//! and tells the vehicle behind that its predecessor is gone — exactly once
//! per departure (`predecessor_gone_sent`).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uta_core::{EntityId, TimeValue};
use uta_delivery::DedupFilter;
use uta_route::{Route, Step, Traversal};

use crate::behavior::{DecideCtx, Decision, EntityBehavior};
use crate::map::Position;
use crate::proto::{
    Command, CrossingCommand, CrossroadCommand, Effect, Event, LaneCommand, MobileCommand,
    StopCommand,
};

// ── MobileKind / MobileSpec ───────────────────────────────────────────────────

/// What kind of participant a mobile is.  Pedestrians request the walking
/// side of pedestrian crossings; everything else requests the driving side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobileKind {
    Pedestrian,
    Car,
    Bus,
    Tram,
}

impl MobileKind {
    pub fn is_pedestrian(self) -> bool {
        matches!(self, MobileKind::Pedestrian)
    }
}

/// Everything the creator hands a new mobile: its kind, its route, and how
/// long it rests at each day-cycle destination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MobileSpec {
    pub kind: MobileKind,
    pub route: Route,
    /// Ticks spent asleep after finishing a route segment (triple routes
    /// only; buses and trams never rest).
    pub rest_ticks: u32,
}

// ── MotionState ───────────────────────────────────────────────────────────────

/// Progress through the current step's geometry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionState {
    /// Points visited one per tick.  Empty for steps without geometry
    /// (the step then takes a single tick).
    pub points: Vec<Position>,
    pub point_index: usize,
    /// Set on step entry, cleared by the first point advancement.
    pub begin_of_step: bool,
}

// ── PendingGrant ──────────────────────────────────────────────────────────────

/// An outstanding request this mobile must not repeat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct PendingGrant {
    /// Who owes us an answer.
    of: EntityId,
    /// `true`: the grant advances the cursor (next step, stop departure,
    /// sleep approval).  `false`: the grant lets us enter the current step.
    advance: bool,
}

// ── MobileState ───────────────────────────────────────────────────────────────

/// State of one mobile entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MobileState {
    id:   EntityId,
    host: Option<EntityId>,
    kind: Option<MobileKind>,
    rest_ticks: u32,
    traversal: Option<Traversal>,
    motion: MotionState,
    pending: Option<PendingGrant>,
    /// `true` once the mobile has entered the step its cursor points at.
    entered: bool,
    /// The vehicle ahead on the current lane.
    next_vehicle: Option<EntityId>,
    /// The vehicle behind on the current lane.
    previous_vehicle: Option<EntityId>,
    /// One `PredecessorGone` per departure.
    predecessor_gone_sent: bool,
    paused: bool,
    now: TimeValue,
    dedup: DedupFilter,
}

impl MobileState {
    // ── Decision helpers (all read-only) ──────────────────────────────────

    /// The request that asks `step`'s guardian to let us in, or `None` for
    /// pass-through steps.
    fn entry_request(&self, step: &Step) -> Option<Command> {
        let me = self.id.clone();
        match step {
            Step::Lane(_) => {
                Some(Command::ToLane(LaneCommand::RequestAdmission { vehicle: me }))
            }
            Step::Crossroad(_) => {
                Some(Command::ToCrossroad(CrossroadCommand::RequestToken { vehicle: me }))
            }
            Step::PedestrianCrossing(_) => Some(Command::ToPedestrianCrossing(
                if self.kind.map(MobileKind::is_pedestrian).unwrap_or(false) {
                    CrossingCommand::RequestCross { walker: me }
                } else {
                    CrossingCommand::RequestDrive { vehicle: me }
                },
            )),
            Step::Road(_) | Step::Zone(_) | Step::BusStop { .. } | Step::TramStop { .. } => None,
        }
    }

    /// Enter `step`: load its geometry, announce ourselves to its entity.
    fn enter_step(&self, step: &Step, ctx: &DecideCtx<'_>, decision: &mut Decision) {
        let points = match step {
            Step::Lane(lane) => ctx.map.lane_points(lane).map(<[Position]>::to_vec),
            _                => None,
        };
        decision.push_event(Event::MotionLoaded { points: points.unwrap_or_default() });
        decision.send(
            step.entity_id().clone(),
            Command::MobileEntityAdd { id: self.id.clone() },
        );
    }

    /// Leave `step`: announce departure, settle protocol obligations, and
    /// notify the vehicle behind exactly once.
    fn leave_step(&self, step: &Step, decision: &mut Decision) {
        decision.send(
            step.entity_id().clone(),
            Command::MobileEntityRemove { id: self.id.clone() },
        );
        match step {
            Step::Crossroad(id) => {
                decision.send(
                    id.clone(),
                    Command::ToCrossroad(CrossroadCommand::ReleaseToken {
                        vehicle: self.id.clone(),
                    }),
                );
            }
            Step::PedestrianCrossing(id) => {
                decision.send(
                    id.clone(),
                    Command::ToPedestrianCrossing(CrossingCommand::CrossingDone {
                        id: self.id.clone(),
                    }),
                );
            }
            _ => {}
        }
        if let Some(behind) = &self.previous_vehicle {
            if matches!(step, Step::Lane(_)) && !self.predecessor_gone_sent {
                decision.push_event(Event::PredecessorGoneSent { to: behind.clone() });
                decision.send(behind.clone(), Command::ToMobile(MobileCommand::PredecessorGone));
            }
        }
    }

    /// Look-ahead coordination over the scanning window: a vehicle that can
    /// already see a pedestrian crossing two steps ahead announces itself,
    /// so the crossing schedules its phase before the vehicle arrives.  The
    /// early grant (if any) is ignored until the real entry request; the
    /// crossing re-grants admitted vehicles on demand.
    fn preannounce_ahead(&self, traversal: &Traversal, decision: &mut Decision) {
        if self.kind.map(MobileKind::is_pedestrian).unwrap_or(true) {
            return;
        }
        // Announce only within the current segment: past a segment end the
        // mobile may rest first, and a parked reservation would block the
        // crossing's phase for sleepers.
        if matches!(traversal.route(), Route::Triple { .. })
            && traversal.index() + 2 >= traversal.segment_len()
        {
            return;
        }
        let window = traversal.step_sequence();
        // Window slots hold offsets -2, -1, 0, +1, +2, +3; slot 4 is +2.
        if let Some(Step::PedestrianCrossing(crossing)) = window[4] {
            decision.send(
                crossing.clone(),
                Command::ToPedestrianCrossing(CrossingCommand::RequestDrive {
                    vehicle: self.id.clone(),
                }),
            );
        }
    }

    /// Either request entry into the cursor's current step or enter it
    /// directly (pass-through kinds).
    fn begin_current_step(
        &self,
        traversal: &Traversal,
        ctx: &DecideCtx<'_>,
        decision: &mut Decision,
    ) {
        let step = traversal.current_step();
        match self.entry_request(step) {
            Some(request) => {
                decision.push_event(Event::GrantRequested {
                    of:      step.entity_id().clone(),
                    advance: false,
                });
                decision.send(step.entity_id().clone(), request);
            }
            None => self.enter_step(step, ctx, decision),
        }
    }

    /// Advance off the current step into the next one.  The caller has
    /// already decided the advance is legal (grant in hand or pass-through).
    /// `granted_by` names the entity whose grant triggered the advance so
    /// that a grant from the next step's guardian is not requested twice.
    fn advance_decision(
        &self,
        granted_by: Option<&EntityId>,
        ctx: &DecideCtx<'_>,
        decision: &mut Decision,
    ) {
        let Some(traversal) = &self.traversal else { return };
        self.leave_step(traversal.current_step(), decision);

        let mut post = traversal.clone();
        let advanced = post.advance();
        decision.push_event(Event::StepAdvanced {
            wrapped_to: match advanced {
                uta_route::Advanced::Stepped            => None,
                uta_route::Advanced::Wrapped { now_on } => Some(now_on),
            },
        });

        let next = post.current_step();
        let already_granted = granted_by == Some(next.entity_id());
        match self.entry_request(next) {
            Some(request) if !already_granted => {
                decision.push_event(Event::GrantRequested {
                    of:      next.entity_id().clone(),
                    advance: false,
                });
                decision.send(next.entity_id().clone(), request);
            }
            _ => self.enter_step(next, ctx, decision),
        }
        self.preannounce_ahead(&post, decision);
    }

    /// The current step's motion is exhausted; decide what happens next.
    fn motion_end_decision(&self, ctx: &DecideCtx<'_>, decision: &mut Decision) {
        let Some(traversal) = &self.traversal else { return };
        let current = traversal.current_step();

        // Single-point lanes never got a motion advancement, so the entry
        // zone was never reported clear; do it now.
        if let Step::Lane(lane) = current {
            if self.motion.begin_of_step {
                decision.send(lane.clone(), Command::HandleLastVehicle);
            }
        }

        // Dwell at stops: announce arrival and wait for the departure grant.
        if let Step::BusStop { stop, dwell_ticks } | Step::TramStop { stop, dwell_ticks } = current
        {
            decision.push_event(Event::GrantRequested { of: stop.clone(), advance: true });
            decision.send(
                stop.clone(),
                Command::ToStop(StopCommand::Arrive {
                    vehicle:     self.id.clone(),
                    dwell_ticks: *dwell_ticks,
                }),
            );
            return;
        }

        // Day-cycle rest: finishing the last step of a triple-route segment
        // puts the mobile to sleep at its destination.
        let at_segment_end = traversal.index() + 1 == traversal.segment_len();
        if at_segment_end && matches!(traversal.route(), Route::Triple { .. }) {
            if let Some(host) = &self.host {
                let wake_at = self.now.offset(u64::from(self.rest_ticks));
                decision.push_event(Event::GrantRequested { of: host.clone(), advance: true });
                decision.send(host.clone(), Command::PauseExecution { wake_at });
            } else {
                warn!(mobile = %self.id, "segment end with no host to sleep at");
            }
            return;
        }

        // Otherwise: move on.  Arbitrated next steps need a grant first.
        let next = traversal.step_at(1);
        match next {
            Some(step) => match self.entry_request(step) {
                Some(request) => {
                    decision.push_event(Event::GrantRequested {
                        of:      step.entity_id().clone(),
                        advance: true,
                    });
                    decision.send(step.entity_id().clone(), request);
                }
                None => self.advance_decision(None, ctx, decision),
            },
            None => warn!(mobile = %self.id, "route has no next step"),
        }
    }

    /// Re-issue whatever request `pending` stands for (respawn recovery:
    /// the request, or its answer, may have been lost with us).
    fn reissue_pending(&self, pending: &PendingGrant, decision: &mut Decision) {
        // A pending answer from the host is a sleep approval in flight.
        if Some(&pending.of) == self.host.as_ref() && pending.advance {
            let wake_at = self.now.offset(u64::from(self.rest_ticks));
            decision.send(pending.of.clone(), Command::PauseExecution { wake_at });
            return;
        }
        // Otherwise the target is the current step (entry / stop dwell) or
        // the next step (advance).
        let Some(traversal) = &self.traversal else { return };
        let candidates = [Some(traversal.current_step()), traversal.step_at(1)];
        for step in candidates.into_iter().flatten() {
            if step.entity_id() != &pending.of {
                continue;
            }
            match step {
                Step::BusStop { stop, dwell_ticks } | Step::TramStop { stop, dwell_ticks } => {
                    decision.send(
                        stop.clone(),
                        Command::ToStop(StopCommand::Arrive {
                            vehicle:     self.id.clone(),
                            dwell_ticks: *dwell_ticks,
                        }),
                    );
                }
                _ => {
                    if let Some(request) = self.entry_request(step) {
                        decision.send(step.entity_id().clone(), request);
                    }
                }
            }
            return;
        }
        debug!(mobile = %self.id, of = %pending.of, "pending grant target no longer near the cursor");
    }
}

impl EntityBehavior for MobileState {
    fn empty(id: EntityId) -> Self {
        Self {
            id,
            host: None,
            kind: None,
            rest_ticks: 0,
            traversal: None,
            motion: MotionState::default(),
            pending: None,
            entered: false,
            next_vehicle: None,
            previous_vehicle: None,
            predecessor_gone_sent: false,
            paused: false,
            now: TimeValue::ZERO,
            dedup: DedupFilter::new(),
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
        match command {
            Command::ToMobile(MobileCommand::AssignRoute { spec }) => {
                if self.traversal.is_some() {
                    debug!(mobile = %self.id, "route re-assigned; keeping the original");
                    return Decision::none();
                }
                let mut decision = Decision::event(Event::RouteAssigned {
                    spec: spec.clone(),
                    host: from.clone(),
                });
                let traversal = Traversal::new(spec.route.clone());
                // Speculative state with kind/host set, so entry requests
                // pick the right crossing side.
                let mut post = self.clone();
                post.apply(&Event::RouteAssigned { spec: spec.clone(), host: from.clone() });
                post.begin_current_step(&traversal, ctx, &mut decision);
                decision
            }

            Command::ToMobile(MobileCommand::ProceedGranted { from: granter }) => {
                let Some(pending) = &self.pending else {
                    debug!(mobile = %self.id, %granter, "grant with nothing pending; ignored");
                    return Decision::none();
                };
                if &pending.of != granter {
                    debug!(mobile = %self.id, %granter, expected = %pending.of, "grant from unexpected entity");
                    return Decision::none();
                }
                let mut decision = Decision::none();
                if pending.advance {
                    self.advance_decision(Some(granter), ctx, &mut decision);
                } else if let Some(traversal) = &self.traversal {
                    self.enter_step(traversal.current_step(), ctx, &mut decision);
                }
                decision
            }

            Command::ToMobile(MobileCommand::PredecessorIs { id }) => {
                Decision::event(Event::NextVehicleChanged { id: id.clone() })
            }

            Command::ToMobile(MobileCommand::SuccessorIs { id }) => {
                Decision::event(Event::PreviousVehicleChanged { id: Some(id.clone()) })
            }

            Command::ToMobile(MobileCommand::PredecessorGone) => {
                Decision::event(Event::NextVehicleChanged { id: None })
            }

            Command::ToMobile(MobileCommand::SleepApproved { wake_at }) => {
                if self.paused {
                    return Decision::none();
                }
                let Some(traversal) = &self.traversal else {
                    return Decision::none();
                };
                let mut decision = Decision::none();
                self.leave_step(traversal.current_step(), &mut decision);

                let mut post = traversal.clone();
                let advanced = post.advance();
                decision.push_event(Event::StepAdvanced {
                    wrapped_to: match advanced {
                        uta_route::Advanced::Stepped            => None,
                        uta_route::Advanced::Wrapped { now_on } => Some(now_on),
                    },
                });
                decision.push_event(Event::MobilePaused { wake_at: *wake_at });
                decision.push_effect(Effect::StopSelf);
                decision
            }

            Command::ResumeExecution => {
                let Some(traversal) = &self.traversal else {
                    warn!(mobile = %self.id, "resume before any route was assigned");
                    return Decision::none();
                };
                let mut decision = Decision::none();
                if self.paused {
                    decision.push_event(Event::MobileResumed);
                    self.begin_current_step(traversal, ctx, &mut decision);
                } else if let Some(pending) = &self.pending {
                    // Respawn while a request was in flight: ask again.
                    self.reissue_pending(pending, &mut decision);
                } else if !self.entered {
                    self.begin_current_step(traversal, ctx, &mut decision);
                }
                // Entered and moving: the tick stream carries on.
                decision
            }

            Command::Time { .. } => {
                // observe_time has already run; self.now is current.
                if self.paused || self.pending.is_some() || !self.entered {
                    return Decision::none();
                }
                if self.traversal.is_none() {
                    return Decision::none();
                }
                let mut decision = Decision::none();
                if self.motion.point_index + 1 < self.motion.points.len() {
                    decision.push_event(Event::MotionAdvanced {
                        point_index: self.motion.point_index + 1,
                    });
                    // First movement within a lane clears its entry zone.
                    if self.motion.begin_of_step {
                        if let Some(traversal) = &self.traversal {
                            if let Step::Lane(lane) = traversal.current_step() {
                                decision.send(lane.clone(), Command::HandleLastVehicle);
                            }
                        }
                    }
                } else {
                    self.motion_end_decision(ctx, &mut decision);
                }
                decision
            }

            other => {
                warn!(mobile = %self.id, command = ?other, "we should not be here: command does not match entity kind");
                Decision::none()
            }
        }
    }

    fn apply(&mut self, event: &Event) {
        match event {
            Event::NoDuplicate { sender, delivery_id } => {
                self.dedup.record(sender, *delivery_id);
            }
            Event::RouteAssigned { spec, host } => {
                self.host = Some(host.clone());
                self.kind = Some(spec.kind);
                self.rest_ticks = spec.rest_ticks;
                self.traversal = Some(Traversal::new(spec.route.clone()));
                self.entered = false;
            }
            Event::GrantRequested { of, advance } => {
                self.pending = Some(PendingGrant { of: of.clone(), advance: *advance });
            }
            Event::StepAdvanced { wrapped_to } => {
                if let Some(traversal) = &mut self.traversal {
                    let advanced = traversal.advance();
                    let wrapped = match advanced {
                        uta_route::Advanced::Stepped            => None,
                        uta_route::Advanced::Wrapped { now_on } => Some(now_on),
                    };
                    if wrapped != *wrapped_to {
                        warn!(mobile = %self.id, "journaled wrap disagrees with cursor state");
                    }
                } else {
                    warn!(mobile = %self.id, "step advancement without a route; ignored");
                }
                self.pending = None;
                self.entered = false;
                self.predecessor_gone_sent = false;
                self.next_vehicle = None;
                self.previous_vehicle = None;
            }
            Event::MotionLoaded { points } => {
                self.motion = MotionState {
                    points:        points.clone(),
                    point_index:   0,
                    begin_of_step: true,
                };
                self.pending = None;
                self.entered = true;
            }
            Event::MotionAdvanced { point_index } => {
                self.motion.point_index = *point_index;
                self.motion.begin_of_step = false;
            }
            Event::NextVehicleChanged { id } => {
                self.next_vehicle = id.clone();
            }
            Event::PreviousVehicleChanged { id } => {
                self.previous_vehicle = id.clone();
            }
            Event::PredecessorGoneSent { .. } => {
                self.predecessor_gone_sent = true;
            }
            Event::MobilePaused { .. } => {
                self.paused = true;
                self.pending = None;
            }
            Event::MobileResumed => {
                self.paused = false;
            }
            Event::OutboundRecorded { .. } | Event::OutboundConfirmed { .. } => {}
            other => {
                debug!(mobile = %self.id, event = ?other, "event not applicable to a mobile; ignored");
            }
        }
    }

    fn recovery_completed(&self) -> Decision {
        // A recovered mobile is restarted by its parent's ResumeExecution;
        // it takes no bootstrap action of its own.
        Decision::none()
    }
}

impl MobileState {
    // ── Accessors (tests, introspection) ──────────────────────────────────

    pub fn traversal(&self) -> Option<&Traversal> {
        self.traversal.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_entered(&self) -> bool {
        self.entered
    }

    pub fn host(&self) -> Option<&EntityId> {
        self.host.as_ref()
    }

    pub fn kind(&self) -> Option<MobileKind> {
        self.kind
    }

    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    pub fn next_vehicle(&self) -> Option<&EntityId> {
        self.next_vehicle.as_ref()
    }

    pub fn previous_vehicle(&self) -> Option<&EntityId> {
        self.previous_vehicle.as_ref()
    }
}
