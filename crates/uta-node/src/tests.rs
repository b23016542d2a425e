//! Unit tests for the hosting binary's scenario loader.

use uta_core::EntityId;
use uta_entities::MobileKind;
use uta_route::{Route, SegmentTag, Step};

use crate::scenario::ScenarioDoc;

fn id(s: &str) -> EntityId {
    EntityId::new(s).unwrap()
}

const SCENARIO: &str = r#"{
    "mobiles": [
        {
            "id": "V-1",
            "kind": "car",
            "host": "Z-1",
            "rest_ticks": 12,
            "segments": [
                ["L-1", "C-1", "L-2"],
                ["L-2", "P-1", "L-1"],
                ["L-1", "L-2"]
            ]
        },
        {
            "id": "bus-1",
            "kind": "bus",
            "host": "B-1",
            "segments": [["L-1", "B-1", "L-2"]]
        }
    ]
}"#;

#[test]
fn car_seed_builds_a_triple_route() {
    let doc: ScenarioDoc = serde_json::from_str(SCENARIO).unwrap();
    let spec = doc.mobiles[0].to_spec().unwrap();

    assert_eq!(spec.kind, MobileKind::Car);
    assert_eq!(spec.rest_ticks, 12);
    let Route::Triple { house_to_work, work_to_fun, fun_to_home } = &spec.route else {
        panic!("expected a triple route");
    };
    assert_eq!(house_to_work.len(), 3);
    assert_eq!(work_to_fun.len(), 3);
    assert_eq!(fun_to_home.len(), 2);
    // Kinds are derived from ID tags.
    assert!(matches!(house_to_work[1], Step::Crossroad(_)));
    assert!(matches!(work_to_fun[1], Step::PedestrianCrossing(_)));
}

#[test]
fn bus_seed_builds_a_single_route_with_default_dwell() {
    let doc: ScenarioDoc = serde_json::from_str(SCENARIO).unwrap();
    let spec = doc.mobiles[1].to_spec().unwrap();

    assert_eq!(spec.kind, MobileKind::Bus);
    let Route::Single { steps } = &spec.route else {
        panic!("expected a single route");
    };
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[1], Step::BusStop { stop: id("B-1"), dwell_ticks: 2 });
    assert_eq!(spec.route.segment(SegmentTag::Single).unwrap().len(), 3);
}

#[test]
fn wrong_segment_count_is_rejected() {
    let bad = r#"{ "mobiles": [
        { "id": "V-1", "kind": "car", "host": "Z-1", "segments": [["L-1"]] }
    ] }"#;
    let doc: ScenarioDoc = serde_json::from_str(bad).unwrap();
    assert!(doc.mobiles[0].to_spec().is_err());
}

#[test]
fn mobile_ids_as_steps_are_rejected() {
    let bad = r#"{ "mobiles": [
        { "id": "bus-2", "kind": "bus", "host": "B-1", "segments": [["V-1"]] }
    ] }"#;
    let doc: ScenarioDoc = serde_json::from_str(bad).unwrap();
    assert!(doc.mobiles[0].to_spec().is_err());
}
