//! Sender-side at-least-once delivery tracking.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uta_core::{DeliveryId, EntityId};

use crate::BackoffPolicy;

// ── PendingSend ───────────────────────────────────────────────────────────────

/// One reliable outbound message, exactly as it will appear on the wire.
///
/// The `DeliveryId` is assigned before the envelope is built so the receiver
/// sees the same ID the tracker retries under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSend<C> {
    pub delivery_id: DeliveryId,
    pub dest:        EntityId,
    pub command:     C,
}

// ── DeliveryState ─────────────────────────────────────────────────────────────

/// The persistable portion of a [`DeliveryTracker`]: everything needed to
/// resume retries after a restart.  Retry timing (attempt counts, due times)
/// is deliberately absent — a recovered tracker starts its backoff ladder
/// from the beginning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryState<C> {
    /// Last assigned delivery ID (IDs may have gaps; they only ever grow).
    pub last_id: DeliveryId,
    /// Sends without a confirming ack, in ID order.
    pub unconfirmed: Vec<PendingSend<C>>,
}

impl<C> Default for DeliveryState<C> {
    fn default() -> Self {
        Self { last_id: DeliveryId::ZERO, unconfirmed: Vec::new() }
    }
}

// ── DeliveryTracker ───────────────────────────────────────────────────────────

struct Pending<C> {
    send:      PendingSend<C>,
    attempts:  u32,
    due_at_ms: u64,
}

/// Per-entity outbound registry of unacknowledged reliable sends.
///
/// Time is a caller-supplied millisecond counter (the runtime uses
/// milliseconds since process start).  The tracker never sleeps; the caller
/// asks [`next_due_ms`][Self::next_due_ms] when to come back and then calls
/// [`due`][Self::due] to collect what must be retransmitted.
pub struct DeliveryTracker<C> {
    last_id: DeliveryId,
    pending: BTreeMap<DeliveryId, Pending<C>>,
    policy:  BackoffPolicy,
    rng:     SmallRng,
}

impl<C: Clone> DeliveryTracker<C> {
    pub fn new(policy: BackoffPolicy, seed: u64) -> Self {
        Self {
            last_id: DeliveryId::ZERO,
            pending: BTreeMap::new(),
            policy,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Assign the next delivery ID and build the wire payload for it.
    ///
    /// The send is **not** registered yet: the caller journals it first and
    /// registers via [`register`][Self::register] once the record is
    /// durable, so that a crash between the two cannot lose a tracked send
    /// that was never written down.
    pub fn allocate(&mut self, dest: EntityId, command: C) -> PendingSend<C> {
        self.last_id = self.last_id.next();
        PendingSend { delivery_id: self.last_id, dest, command }
    }

    /// Start (or resume) tracking `send`; the first retry is scheduled one
    /// backoff step after `now_ms`.  Re-registering a known ID is a no-op,
    /// which makes journal replay idempotent.
    pub fn register(&mut self, send: PendingSend<C>, now_ms: u64) {
        if self.pending.contains_key(&send.delivery_id) {
            return;
        }
        if send.delivery_id > self.last_id {
            self.last_id = send.delivery_id;
        }
        let due_at_ms = now_ms + self.policy.delay_ms(0, &mut self.rng);
        self.pending.insert(
            send.delivery_id,
            Pending { send, attempts: 1, due_at_ms },
        );
    }

    /// Confirm a delivery.  Returns `false` for unknown IDs (late or
    /// duplicate acks), which callers treat as a quiet no-op.
    pub fn confirm(&mut self, id: DeliveryId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Collect every send whose retry is due at `now_ms`, advancing its
    /// backoff.  Sends that exhausted the retry budget are dropped here
    /// with a warning, per the configured policy.
    pub fn due(&mut self, now_ms: u64) -> Vec<PendingSend<C>> {
        let due_ids: Vec<DeliveryId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due_at_ms <= now_ms)
            .map(|(&id, _)| id)
            .collect();

        let mut out = Vec::with_capacity(due_ids.len());
        for id in due_ids {
            let Some(pending) = self.pending.get_mut(&id) else { continue };
            if self.policy.exhausted(pending.attempts) {
                warn!(
                    delivery_id = pending.send.delivery_id.0,
                    dest = %pending.send.dest,
                    attempts = pending.attempts,
                    "giving up on unacknowledged delivery"
                );
                self.pending.remove(&id);
                continue;
            }
            pending.due_at_ms = now_ms + self.policy.delay_ms(pending.attempts, &mut self.rng);
            pending.attempts += 1;
            out.push(pending.send.clone());
        }
        out
    }

    /// Earliest scheduled retry time, if anything is pending.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.pending.values().map(|p| p.due_at_ms).min()
    }

    /// Snapshot of the persistable state.
    pub fn state(&self) -> DeliveryState<C> {
        DeliveryState {
            last_id:     self.last_id,
            unconfirmed: self.pending.values().map(|p| p.send.clone()).collect(),
        }
    }

    /// Rebuild a tracker from persisted state, resuming retries at `now_ms`.
    pub fn from_state(policy: BackoffPolicy, seed: u64, state: DeliveryState<C>, now_ms: u64) -> Self {
        let mut tracker = Self::new(policy, seed);
        tracker.last_id = state.last_id;
        for send in state.unconfirmed {
            tracker.register(send, now_ms);
        }
        tracker
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}
