//! Unit tests for uta-delivery.

use uta_core::{DeliveryId, EntityId, RetryConfig};

use crate::{BackoffPolicy, DedupFilter, DeliveryTracker};

fn id(s: &str) -> EntityId {
    EntityId::new(s).unwrap()
}

/// Deterministic policy: 100 ms base, 1 s cap, no jitter.
fn policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy::new(&RetryConfig {
        base_ms: 100,
        cap_ms: 1_000,
        jitter_ms: 0,
        max_attempts,
    })
}

// ── DedupFilter ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod dedup {
    use super::*;

    #[test]
    fn unknown_sender_accepts_anything_positive() {
        let filter = DedupFilter::new();
        assert!(filter.is_new(&id("V-3"), DeliveryId(1)));
        assert!(!filter.is_new(&id("V-3"), DeliveryId::ZERO));
    }

    #[test]
    fn records_and_rejects_at_or_below_mark() {
        let mut filter = DedupFilter::new();
        filter.record(&id("V-3"), DeliveryId(42));

        assert!(!filter.is_new(&id("V-3"), DeliveryId(42)));
        assert!(!filter.is_new(&id("V-3"), DeliveryId(7)));
        assert!(filter.is_new(&id("V-3"), DeliveryId(43)));
        // Other senders have independent marks.
        assert!(filter.is_new(&id("V-4"), DeliveryId(1)));
    }

    #[test]
    fn monotonic_under_out_of_order_replay() {
        let mut filter = DedupFilter::new();
        // Retries may reorder; the mark must never move backwards.
        filter.record(&id("V-3"), DeliveryId(42));
        filter.record(&id("V-3"), DeliveryId(5));
        assert_eq!(filter.high_water(&id("V-3")), DeliveryId(42));
    }

    #[test]
    fn serde_round_trip() {
        let mut filter = DedupFilter::new();
        filter.record(&id("V-3"), DeliveryId(42));
        let json = serde_json::to_string(&filter).unwrap();
        let back: DedupFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }
}

// ── BackoffPolicy ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod backoff {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn doubles_until_cap() {
        let policy = policy(0);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(policy.delay_ms(0, &mut rng), 100);
        assert_eq!(policy.delay_ms(1, &mut rng), 200);
        assert_eq!(policy.delay_ms(2, &mut rng), 400);
        assert_eq!(policy.delay_ms(3, &mut rng), 800);
        assert_eq!(policy.delay_ms(4, &mut rng), 1_000); // capped
        assert_eq!(policy.delay_ms(40, &mut rng), 1_000);
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let policy = policy(0);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(policy.delay_ms(u32::MAX, &mut rng), 1_000);
    }

    #[test]
    fn exhaustion() {
        let policy = policy(3);
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        // max_attempts = 0 never gives up.
        assert!(!super::policy(0).exhausted(u32::MAX));
    }
}

// ── DeliveryTracker ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tracker {
    use super::*;

    #[test]
    fn allocate_assigns_strictly_increasing_ids() {
        let mut tracker: DeliveryTracker<&str> = DeliveryTracker::new(policy(0), 0);
        let a = tracker.allocate(id("L-1"), "a");
        let b = tracker.allocate(id("L-2"), "b");
        assert_eq!(a.delivery_id, DeliveryId(1));
        assert_eq!(b.delivery_id, DeliveryId(2));
        // Allocation alone tracks nothing.
        assert!(tracker.is_idle());
    }

    #[test]
    fn register_then_confirm() {
        let mut tracker: DeliveryTracker<&str> = DeliveryTracker::new(policy(0), 0);
        let send = tracker.allocate(id("L-1"), "cmd");
        let delivery_id = send.delivery_id;
        tracker.register(send, 0);
        assert_eq!(tracker.pending_count(), 1);

        assert!(tracker.confirm(delivery_id));
        assert!(tracker.is_idle());
        // A second (duplicate) ack is a quiet no-op.
        assert!(!tracker.confirm(delivery_id));
    }

    #[test]
    fn due_respects_backoff_schedule() {
        let mut tracker: DeliveryTracker<&str> = DeliveryTracker::new(policy(0), 0);
        let send = tracker.allocate(id("L-1"), "cmd");
        tracker.register(send, 0);

        // First retry is due 100 ms (base) after registration.
        assert!(tracker.due(99).is_empty());
        let first = tracker.due(100);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].dest, id("L-1"));

        // Second retry backs off to 200 ms after the first.
        assert!(tracker.due(299).is_empty());
        assert_eq!(tracker.due(300).len(), 1);
    }

    #[test]
    fn register_is_idempotent() {
        let mut tracker: DeliveryTracker<&str> = DeliveryTracker::new(policy(0), 0);
        let send = tracker.allocate(id("L-1"), "cmd");
        tracker.register(send.clone(), 0);
        tracker.register(send, 50); // journal replay hits this path
        assert_eq!(tracker.pending_count(), 1);
        // The original schedule stands.
        assert_eq!(tracker.due(100).len(), 1);
    }

    #[test]
    fn exhausted_delivery_is_dropped() {
        let mut tracker: DeliveryTracker<&str> = DeliveryTracker::new(policy(2), 0);
        let send = tracker.allocate(id("L-1"), "cmd");
        tracker.register(send, 0); // attempt 1 (the initial send)

        assert_eq!(tracker.due(100).len(), 1); // attempt 2
        assert!(tracker.due(10_000).is_empty()); // budget exhausted, dropped
        assert!(tracker.is_idle());
    }

    #[test]
    fn state_round_trip_resumes_retries() {
        let mut tracker: DeliveryTracker<String> = DeliveryTracker::new(policy(0), 0);
        let send = tracker.allocate(id("L-1"), "cmd".to_owned());
        tracker.register(send, 0);
        tracker.allocate(id("L-2"), "never-registered".to_owned()); // burns ID 2

        let state = tracker.state();
        assert_eq!(state.last_id, DeliveryId(2));
        assert_eq!(state.unconfirmed.len(), 1);

        let mut revived = DeliveryTracker::from_state(policy(0), 1, state, 1_000);
        // IDs continue after the highest assigned before the restart.
        assert_eq!(revived.allocate(id("L-3"), "next".to_owned()).delivery_id, DeliveryId(3));
        // The unconfirmed send resumes retrying on the new clock.
        assert_eq!(revived.due(1_100).len(), 1);
    }

    #[test]
    fn next_due_reports_earliest() {
        let mut tracker: DeliveryTracker<&str> = DeliveryTracker::new(policy(0), 0);
        assert_eq!(tracker.next_due_ms(), None);
        let a = tracker.allocate(id("L-1"), "a");
        tracker.register(a, 0);
        let b = tracker.allocate(id("L-2"), "b");
        tracker.register(b, 500);
        assert_eq!(tracker.next_due_ms(), Some(100));
    }
}
