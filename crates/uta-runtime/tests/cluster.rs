//! Cluster-level integration tests: real entity tasks, real journaling,
//! in-memory backends.  "Restart" means building a fresh cluster over the
//! same persistence services.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use uta_core::{DeliveryId, EntityId, NodeConfig, SeqNr, TimeValue};
use uta_entities::map::CityMap;
use uta_entities::proto::{Command, Envelope, Event, LaneCommand, Message};
use uta_entities::{MobileKind, MobileSpec};
use uta_journal::EventJournal;
use uta_route::{Route, Step};
use uta_runtime::{Cluster, Services};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const MAP_JSON: &str = r#"{
    "roads": [{ "id": "R-1", "lanes": ["L-1", "L-2"] }],
    "lanes": [
        { "id": "L-1", "road": "R-1", "length_m": 120.0,
          "points": [{ "lat": 0.0, "lon": 0.0 }, { "lat": 0.0, "lon": 0.001 }] },
        { "id": "L-2", "road": "R-1", "length_m": 80.0,
          "points": [{ "lat": 0.0, "lon": 0.002 }, { "lat": 0.0, "lon": 0.003 }] }
    ],
    "crossroads": [{ "id": "C-1", "lanes": ["L-1", "L-2"] }],
    "pedestrian_crossings": [],
    "bus_stops": [],
    "tram_stops": [],
    "zones": [{ "id": "Z-1", "roads": ["R-1"] }]
}"#;

fn id(s: &str) -> EntityId {
    EntityId::new(s).unwrap()
}

fn injector() -> EntityId {
    id("injector")
}

fn config() -> NodeConfig {
    NodeConfig {
        node_count: 2,
        shard_count: 8,
        // Keep the periodic snapshot out of the way unless a test wants it.
        snapshot_interval_secs: 3_600,
        ..NodeConfig::default()
    }
}

fn services() -> Services {
    Services::in_memory(CityMap::from_json(MAP_JSON).unwrap(), config())
}

fn events_of(journal: &Arc<dyn EventJournal>, key: &str) -> Vec<Event> {
    journal
        .replay(key, SeqNr::ZERO)
        .unwrap()
        .into_iter()
        .map(|(_, payload)| serde_json::from_slice(&payload).unwrap())
        .collect()
}

async fn settle() {
    sleep(Duration::from_millis(200)).await;
}

// ── Identity & recovery ───────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn identity_binds_once_and_survives_restart() {
    let services = services();
    let journal = services.journal.clone();

    let cluster = Cluster::new(services.clone());
    cluster.tell(injector(), id("L-1"), Command::Identity { id: id("L-1") });
    settle().await;

    let events = events_of(&journal, "LaneActor-L-1");
    assert!(
        events.iter().any(|e| matches!(e, Event::IdentityArrived { .. })),
        "identity not journaled: {events:?}"
    );
    let before = events.len();

    cluster.shutdown();
    settle().await;

    // Restart: the revived entity is already bound; a re-delivered identity
    // journals nothing new.
    let cluster = Cluster::new(services.clone());
    cluster.tell(injector(), id("L-1"), Command::Identity { id: id("L-1") });
    settle().await;
    assert_eq!(events_of(&journal, "LaneActor-L-1").len(), before);
    cluster.shutdown();
}

// ── S1: dedup across restart ──────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_request_produces_one_effect_even_across_restart() {
    let services = services();
    let journal = services.journal.clone();

    let cluster = Cluster::new(services.clone());
    cluster.tell(injector(), id("L-1"), Command::Identity { id: id("L-1") });
    settle().await;

    let request = Envelope {
        from:    id("V-3"),
        to:      id("L-1"),
        message: Message::Request {
            delivery_id: DeliveryId(42),
            command:     Command::ToLane(LaneCommand::RequestAdmission { vehicle: id("V-3") }),
        },
    };
    cluster.route(request.clone());
    settle().await;
    cluster.route(request.clone());
    settle().await;

    let admissions = |events: &[Event]| {
        events
            .iter()
            .filter(|e| matches!(e, Event::LaneAdmissionAccepted { .. }))
            .count()
    };
    let no_duplicates = |events: &[Event]| {
        events
            .iter()
            .filter(|e| {
                matches!(e, Event::NoDuplicate { sender, delivery_id }
                    if *sender == id("V-3") && *delivery_id == DeliveryId(42))
            })
            .count()
    };

    let events = events_of(&journal, "LaneActor-L-1");
    assert_eq!(admissions(&events), 1, "duplicate applied twice: {events:?}");
    assert_eq!(no_duplicates(&events), 1);

    cluster.shutdown();
    settle().await;

    // Restart, then redeliver the very same request.
    let cluster = Cluster::new(services.clone());
    cluster.route(request);
    settle().await;

    let events = events_of(&journal, "LaneActor-L-1");
    assert_eq!(admissions(&events), 1, "replayed duplicate applied: {events:?}");
    assert_eq!(no_duplicates(&events), 1);
    cluster.shutdown();
}

// ── End-to-end: a car's day cycle ─────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn car_walks_its_route_sleeps_and_wakes() {
    let services = services();
    let journal = services.journal.clone();
    let cluster = Cluster::new(services.clone());

    for entity in ["R-1", "L-1", "L-2", "C-1", "Z-1"] {
        cluster.tell(injector(), id(entity), Command::Identity { id: id(entity) });
    }
    settle().await;

    // One-lane segments make the day cycle short: enter L-2, traverse its
    // two points, reach the segment end, sleep three ticks, repeat.
    let segment = || vec![Step::Lane(id("L-2"))];
    let spec = MobileSpec {
        kind:       MobileKind::Car,
        route:      Route::triple(segment(), segment(), segment()).unwrap(),
        rest_ticks: 3,
    };
    cluster.tell(
        injector(),
        id("Z-1"),
        Command::CreateMobileEntity { id: id("V-1"), spec },
    );
    settle().await;

    // Drive the clock by hand.
    for tick in 1..=12u64 {
        services.time.publish(TimeValue(tick));
        sleep(Duration::from_millis(80)).await;
    }

    let car_events = events_of(&journal, "MobileActor-V-1");
    assert!(car_events.iter().any(|e| matches!(e, Event::RouteAssigned { .. })));
    assert!(car_events.iter().any(|e| matches!(e, Event::MotionLoaded { .. })));
    assert!(car_events.iter().any(|e| matches!(e, Event::MotionAdvanced { .. })));
    assert!(
        car_events.iter().any(|e| matches!(e, Event::MobilePaused { .. })),
        "car never reached its segment end: {car_events:?}"
    );
    assert!(
        car_events.iter().any(|e| matches!(e, Event::MobileResumed)),
        "car never woke up: {car_events:?}"
    );

    let host_events = events_of(&journal, "ZoneActor-Z-1");
    assert!(host_events.iter().any(|e| matches!(e, Event::MobileEntitySleeping { .. })));
    assert!(host_events.iter().any(|e| matches!(e, Event::MobileEntityWakingUp { .. })));

    let lane_events = events_of(&journal, "LaneActor-L-2");
    assert!(lane_events.iter().any(|e| matches!(e, Event::LaneAdmissionAccepted { .. })));
    assert!(lane_events.iter().any(|e| matches!(e, Event::MobileEntityArrived { .. })));
    assert!(lane_events.iter().any(|e| matches!(e, Event::MobileEntityGone { .. })));

    cluster.shutdown();
}

// ── S5: snapshot rotation ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_rotation_truncates_the_covered_journal_prefix() {
    let mut config = config();
    config.snapshot_interval_secs = 1;
    let services =
        Services::in_memory(CityMap::from_json(MAP_JSON).unwrap(), config);
    let journal = services.journal.clone();
    let snapshots = services.snapshots.clone();

    let cluster = Cluster::new(services.clone());
    cluster.tell(injector(), id("L-1"), Command::Identity { id: id("L-1") });
    settle().await;

    sleep(Duration::from_millis(1_300)).await;
    let (first_meta, _) = snapshots
        .latest("LaneActor-L-1")
        .unwrap()
        .expect("first snapshot missing");
    // Everything the snapshot covers is gone from the journal.
    let remaining = journal.replay("LaneActor-L-1", SeqNr::ZERO).unwrap();
    assert!(remaining.iter().all(|(seq, _)| *seq > first_meta.seq_nr));

    // More events, another cycle: the newer snapshot supersedes the first.
    let request = Envelope {
        from:    id("V-3"),
        to:      id("L-1"),
        message: Message::Request {
            delivery_id: DeliveryId(1),
            command:     Command::ToLane(LaneCommand::RequestAdmission { vehicle: id("V-3") }),
        },
    };
    cluster.route(request);
    sleep(Duration::from_millis(1_300)).await;

    let (second_meta, _) = snapshots
        .latest("LaneActor-L-1")
        .unwrap()
        .expect("second snapshot missing");
    assert!(second_meta.seq_nr > first_meta.seq_nr);
    let remaining = journal.replay("LaneActor-L-1", SeqNr::ZERO).unwrap();
    assert!(remaining.iter().all(|(seq, _)| *seq > second_meta.seq_nr));

    // The recovered state still knows everything the snapshot absorbed.
    cluster.shutdown();
    settle().await;
    let cluster = Cluster::new(services.clone());
    let duplicate = Envelope {
        from:    id("V-3"),
        to:      id("L-1"),
        message: Message::Request {
            delivery_id: DeliveryId(1),
            command:     Command::ToLane(LaneCommand::RequestAdmission { vehicle: id("V-3") }),
        },
    };
    cluster.route(duplicate);
    settle().await;
    let events = events_of(&journal, "LaneActor-L-1");
    assert!(
        !events.iter().any(|e| matches!(e, Event::LaneAdmissionAccepted { .. })),
        "dedup mark lost across snapshot + restart: {events:?}"
    );
    cluster.shutdown();
}
