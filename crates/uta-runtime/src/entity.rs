//! The per-entity command/recovery loop.
//!
//! One tokio task per live entity.  The task owns the entity state, its
//! delivery tracker, and its mailbox; everything it does is strictly
//! sequential, which is what makes persist-then-apply airtight: an event is
//! journaled, then applied, and no other command for this entity can run in
//! between.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uta_core::{DeliveryId, EntityId, SeqNr, TimeValue};
use uta_delivery::{BackoffPolicy, DeliveryState, DeliveryTracker, PendingSend};
use uta_entities::behavior::{DecideCtx, Decision, EntityBehavior};
use uta_entities::proto::{Command, Effect, Envelope, Event, Message, VizEvent};
use uta_entities::AnyEntity;
use uta_journal::SnapshotMeta;

use crate::node::{Cluster, Node};
use crate::{RuntimeError, RuntimeResult};

/// How often the delivery tracker is swept for due retries.
const RETRY_SWEEP: Duration = Duration::from_millis(100);

/// The sender ID stamped on loop-backed time commands.
fn time_sender() -> EntityId {
    EntityId::new("timeMessage").expect("constant ID is non-empty")
}

// ── SnapshotBlob ──────────────────────────────────────────────────────────────

/// What one snapshot holds: the entity state plus the persistable part of
/// the delivery tracker, so unconfirmed sends survive journal truncation.
#[derive(Serialize, Deserialize)]
struct SnapshotBlob {
    state:    AnyEntity,
    delivery: DeliveryState<Command>,
}

// ── EntityTask ────────────────────────────────────────────────────────────────

struct EntityTask {
    id:       EntityId,
    key:      String,
    state:    AnyEntity,
    tracker:  DeliveryTracker<Command>,
    now_tick: TimeValue,
    epoch:    Instant,
    node:     Arc<Node>,
    cluster:  Arc<Cluster>,
}

/// Entry point: recover, bootstrap, then serve until stopped.
pub(crate) async fn run(
    id: EntityId,
    mut rx: mpsc::Receiver<Envelope>,
    node: Arc<Node>,
    cluster: Arc<Cluster>,
) {
    let key = id.persistence_key();
    let mut task = match EntityTask::recover(id.clone(), key, node, cluster) {
        Ok(task) => task,
        Err(e) => {
            // Fatal: the shard supervisor (the registry) restarts us on the
            // next envelope, which restarts recovery.
            error!(entity = %id, error = %e, "recovery failed; stopping entity");
            return;
        }
    };

    // Bootstrap (immovables respawn their children).  Commands that arrived
    // during recovery are already waiting in the mailbox behind this.
    let bootstrap = task.state.recovery_completed();
    if let Err(e) = task.commit(bootstrap) {
        error!(entity = %task.id, error = %e, "bootstrap failed; stopping entity");
        task.node.deregister(&task.id);
        return;
    }

    let mut ticks = task.cluster.services().time.subscribe();
    let mut ticks_open = true;

    let snapshot_period =
        Duration::from_secs(task.cluster.services().config.snapshot_interval_secs.max(1));
    let mut snapshot_timer =
        tokio::time::interval_at(Instant::now() + snapshot_period, snapshot_period);
    snapshot_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut retry_timer = tokio::time::interval(RETRY_SWEEP);
    retry_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!(entity = %task.id, "entity live");
    loop {
        let outcome = tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(envelope) => task.handle_envelope(envelope),
                None           => break, // node shut down
            },
            tick = ticks.recv(), if ticks_open => match tick {
                Ok(now) => task.handle_tick(now),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(entity = %task.id, skipped, "tick stream lagged; skipping ahead");
                    Ok(Flow::Continue)
                }
                Err(broadcast::error::RecvError::Closed) => {
                    ticks_open = false;
                    Ok(Flow::Continue)
                }
            },
            _ = snapshot_timer.tick() => {
                task.save_snapshot();
                Ok(Flow::Continue)
            }
            _ = retry_timer.tick() => {
                task.retransmit_due();
                Ok(Flow::Continue)
            }
        };

        match outcome {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => {
                info!(entity = %task.id, "entity stopping (local terminate)");
                break;
            }
            Err(e) => {
                // Storage unavailability on the write path is fatal to the
                // hosting entity.
                error!(entity = %task.id, error = %e, "write path failed; stopping entity");
                break;
            }
        }
    }
    task.node.deregister(&task.id);
}

/// What a handled unit of work tells the main loop.
enum Flow {
    Continue,
    Stop,
}

impl EntityTask {
    // ── Recovery ──────────────────────────────────────────────────────────

    fn recover(
        id: EntityId,
        key: String,
        node: Arc<Node>,
        cluster: Arc<Cluster>,
    ) -> RuntimeResult<EntityTask> {
        let services = cluster.services().clone();
        let policy = BackoffPolicy::new(&services.config.retry);
        let seed = services.config.seed ^ seed_of(&key);

        let mut task = EntityTask {
            state: AnyEntity::for_id(id.clone()),
            tracker: DeliveryTracker::new(policy.clone(), seed),
            now_tick: TimeValue::ZERO,
            epoch: Instant::now(),
            id,
            key,
            node,
            cluster,
        };

        let mut from = SeqNr::ZERO;
        if let Some((meta, blob)) = services.snapshots.latest(&task.key)? {
            let blob: SnapshotBlob = serde_json::from_slice(&blob)?;
            if blob.state.id() != &task.id {
                return Err(RuntimeError::Recovery {
                    key:    task.key.clone(),
                    detail: format!("snapshot belongs to {}", blob.state.id()),
                });
            }
            task.state = blob.state;
            task.tracker = DeliveryTracker::from_state(policy, seed, blob.delivery, task.now_ms());
            from = meta.seq_nr;
        }

        let events = services.journal.replay(&task.key, from)?;
        let replayed = events.len();
        for (_, payload) in events {
            let event: Event = serde_json::from_slice(&payload)?;
            task.apply_event(&event);
        }
        if replayed > 0 || from > SeqNr::ZERO {
            info!(entity = %task.id, snapshot_seq = from.0, replayed, "recovery completed");
        }
        Ok(task)
    }

    // ── Envelope handling ─────────────────────────────────────────────────

    fn handle_envelope(&mut self, envelope: Envelope) -> RuntimeResult<Flow> {
        match envelope.message {
            Message::Ack { delivery_id } => self.handle_ack(delivery_id),
            Message::Tell { command } => self.dispatch(&envelope.from, &command),
            Message::Request { delivery_id, command } => {
                // Ack first, process second: receipt is acknowledged even
                // for duplicates, effects happen at most once.
                self.cluster.route(Envelope {
                    from:    self.id.clone(),
                    to:      envelope.from.clone(),
                    message: Message::Ack { delivery_id },
                });
                if !self.state.dedup().is_new(&envelope.from, delivery_id) {
                    debug!(entity = %self.id, sender = %envelope.from, %delivery_id, "duplicate dropped");
                    return Ok(Flow::Continue);
                }
                self.journal_and_apply(&Event::NoDuplicate {
                    sender: envelope.from.clone(),
                    delivery_id,
                })?;
                self.dispatch(&envelope.from, &command)
            }
        }
    }

    fn handle_ack(&mut self, delivery_id: DeliveryId) -> RuntimeResult<Flow> {
        // Unknown IDs are late or duplicate acks; nothing to record.
        if self.tracker.confirm(delivery_id) {
            self.journal_and_apply(&Event::OutboundConfirmed { delivery_id })?;
        }
        Ok(Flow::Continue)
    }

    fn handle_tick(&mut self, now: TimeValue) -> RuntimeResult<Flow> {
        self.now_tick = now;
        self.dispatch(&time_sender(), &Command::Time { now })
    }

    /// Decide and commit one command.
    fn dispatch(&mut self, from: &EntityId, command: &Command) -> RuntimeResult<Flow> {
        self.state.observe_time(self.now_tick);
        let services = self.cluster.services().clone();
        let decision = {
            let ctx = DecideCtx {
                now:       self.now_tick,
                map:       services.map.as_ref(),
                node:      &self.node.name,
                node_addr: self.node.addr.as_str(),
            };
            self.state.decide(from, command, &ctx)
        };
        self.commit(decision)
    }

    // ── Persist-then-apply ────────────────────────────────────────────────

    /// Journal every event (each durable before it is applied), then run
    /// the effects.  A journal failure aborts the rest of the command.
    fn commit(&mut self, decision: Decision) -> RuntimeResult<Flow> {
        for event in &decision.events {
            self.journal_and_apply(event)?;
        }

        let mut flow = Flow::Continue;
        for effect in decision.effects {
            match effect {
                Effect::Send { to, command } => {
                    if to == self.id {
                        // Self-sends loop back unreliably: there is nobody
                        // else to ack them.
                        self.cluster.route(Envelope {
                            from:    self.id.clone(),
                            to:      self.id.clone(),
                            message: Message::Tell { command },
                        });
                    } else {
                        self.reliable_send(to, command)?;
                    }
                }
                Effect::SpawnMobile { id } => {
                    self.cluster.spawn(&id);
                }
                Effect::StopSelf => {
                    flow = Flow::Stop;
                }
            }
        }
        Ok(flow)
    }

    fn journal_and_apply(&mut self, event: &Event) -> RuntimeResult<()> {
        let payload = serde_json::to_vec(event)?;
        let services = self.cluster.services();
        services.journal.append(&self.key, &payload)?;
        self.apply_event(event);
        self.publish_viz(event);
        Ok(())
    }

    /// The single apply path used by live commands and recovery replay.
    fn apply_event(&mut self, event: &Event) {
        match event {
            Event::OutboundRecorded { send } => {
                self.tracker.register(send.clone(), self.now_ms());
            }
            Event::OutboundConfirmed { delivery_id } => {
                self.tracker.confirm(*delivery_id);
            }
            _ => {}
        }
        self.state.apply(event);
    }

    // ── At-least-once sending ─────────────────────────────────────────────

    /// Assign a delivery ID, journal the send, then put it on the wire.
    fn reliable_send(&mut self, to: EntityId, command: Command) -> RuntimeResult<()> {
        let send = self.tracker.allocate(to, command);
        self.journal_and_apply(&Event::OutboundRecorded { send: send.clone() })?;
        self.transmit(&send);
        Ok(())
    }

    fn transmit(&self, send: &PendingSend<Command>) {
        self.cluster.route(Envelope {
            from:    self.id.clone(),
            to:      send.dest.clone(),
            message: Message::Request {
                delivery_id: send.delivery_id,
                command:     send.command.clone(),
            },
        });
    }

    fn retransmit_due(&mut self) {
        for send in self.tracker.due(self.now_ms()) {
            debug!(entity = %self.id, delivery_id = send.delivery_id.0, dest = %send.dest, "retrying delivery");
            self.transmit(&send);
        }
    }

    // ── Snapshotting ──────────────────────────────────────────────────────

    /// Save a snapshot covering everything journaled so far; on success,
    /// delete the older generation and truncate the covered journal prefix.
    /// Failures are logged and absorbed — the journal still has everything.
    fn save_snapshot(&mut self) {
        let services = self.cluster.services().clone();
        let seq = match services.journal.last_seq(&self.key) {
            Ok(seq) => seq,
            Err(e) => {
                warn!(entity = %self.id, error = %e, "snapshot skipped: journal unavailable");
                return;
            }
        };
        if seq == SeqNr::ZERO {
            return; // nothing to compact
        }

        let blob = SnapshotBlob {
            state:    self.state.clone(),
            delivery: self.tracker.state(),
        };
        let payload = match serde_json::to_vec(&blob) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(entity = %self.id, error = %e, "snapshot skipped: state not encodable");
                return;
            }
        };
        let meta = SnapshotMeta { seq_nr: seq, timestamp: self.now_tick };
        if let Err(e) = services.snapshots.save(&self.key, meta, &payload) {
            warn!(entity = %self.id, error = %e, "snapshot save failed; state intact");
            return;
        }
        debug!(entity = %self.id, seq = seq.0, "snapshot saved");

        // Rotation: only after the new snapshot is durable.  Deletion is
        // idempotent, so a failure here is retried on the next cycle.
        if let Err(e) = services.snapshots.delete(&self.key, seq) {
            warn!(entity = %self.id, error = %e, "old snapshot deletion failed; will retry");
        }
        if let Err(e) = services.journal.truncate(&self.key, seq) {
            warn!(entity = %self.id, error = %e, "journal truncation failed; will retry");
        }
    }

    // ── Small helpers ─────────────────────────────────────────────────────

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn publish_viz(&self, event: &Event) {
        // Reliability bookkeeping is noise to the front-end.
        if matches!(
            event,
            Event::NoDuplicate { .. }
                | Event::OutboundRecorded { .. }
                | Event::OutboundConfirmed { .. }
        ) {
            return;
        }
        let _ = self.cluster.services().viz.send(VizEvent {
            entity: self.id.clone(),
            at:     self.now_tick,
            event:  event.clone(),
        });
    }
}

/// Deterministic per-entity seed component (jitter must not synchronize
/// across entities, but must be reproducible for a given ID).
fn seed_of(key: &str) -> u64 {
    crate::shard::fnv1a64(key.as_bytes())
}
