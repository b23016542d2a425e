//! Unit tests for uta-core.

use crate::{DeliveryId, EntityId, EntityKind, NodeName, SeqNr, SimClock, TimeValue};

// ── IDs ───────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod ids {
    use super::*;

    #[test]
    fn kind_from_static_tags() {
        let cases = [
            ("R-1", EntityKind::Road),
            ("L-7", EntityKind::Lane),
            ("C-3", EntityKind::Crossroad),
            ("P-2", EntityKind::PedestrianCrossing),
            ("B-9", EntityKind::BusStop),
            ("T-4", EntityKind::TramStop),
            ("Z-0", EntityKind::Zone),
        ];
        for (id, kind) in cases {
            assert_eq!(EntityId::new(id).unwrap().kind(), kind);
        }
    }

    #[test]
    fn mobile_namespace_is_everything_else() {
        // Scenario files use both V-… and M-… prefixes for mobiles.
        assert_eq!(EntityId::new("V-3").unwrap().kind(), EntityKind::Mobile);
        assert_eq!(EntityId::new("M-1").unwrap().kind(), EntityKind::Mobile);
        assert_eq!(EntityId::new("x42").unwrap().kind(), EntityKind::Mobile);
    }

    #[test]
    fn empty_id_rejected() {
        assert!(EntityId::new("").is_err());
    }

    #[test]
    fn persistence_key_format() {
        let lane = EntityId::new("L-7").unwrap();
        assert_eq!(lane.persistence_key(), "LaneActor-L-7");

        let car = EntityId::new("V-3").unwrap();
        assert_eq!(car.persistence_key(), "MobileActor-V-3");
    }

    #[test]
    fn immovable_vs_mobile() {
        assert!(EntityKind::Lane.is_immovable());
        assert!(!EntityKind::Lane.is_mobile());
        assert!(EntityKind::Mobile.is_mobile());
        assert!(!EntityKind::Mobile.is_immovable());
    }

    #[test]
    fn counters_start_at_zero_and_increment() {
        assert_eq!(DeliveryId::ZERO.next(), DeliveryId(1));
        assert_eq!(SeqNr(41).next(), SeqNr(42));
        assert_eq!(DeliveryId::default(), DeliveryId::ZERO);
    }

    #[test]
    fn node_name_for_index() {
        assert_eq!(NodeName::for_index(2), NodeName("node-2".to_owned()));
    }

    #[test]
    fn entity_id_serde_is_transparent() {
        let id = EntityId::new("L-7").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"L-7\"");
        let back: EntityId = serde_json::from_str("\"L-7\"").unwrap();
        assert_eq!(back, id);
    }
}

// ── Time ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod time {
    use super::*;

    #[test]
    fn offset_and_since() {
        let t = TimeValue(100);
        assert_eq!(t.offset(50), TimeValue(150));
        assert_eq!(TimeValue(150).since(t), 50);
        assert_eq!(t.since(TimeValue(150)), 0); // saturates
    }

    #[test]
    fn clock_advances_and_maps_to_wall_time() {
        let mut clock = SimClock::new(1_000, 500);
        assert_eq!(clock.current, TimeValue::ZERO);
        assert_eq!(clock.advance(), TimeValue(1));
        clock.advance();
        // 2 ticks * 500 ms = 1 s elapsed.
        assert_eq!(clock.elapsed_secs(), 1);
        assert_eq!(clock.current_unix_secs(), 1_001);
    }

    #[test]
    fn display_formats() {
        assert_eq!(TimeValue(7).to_string(), "T7");
    }
}
