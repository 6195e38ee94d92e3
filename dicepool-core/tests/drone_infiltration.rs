mod common;

use dicepool_core::testing::{
    assert_hits, assert_notice, assert_pool, sample_action_item, sample_drone, sample_summoner,
    TestHarness,
};
use dicepool_core::{EngineConfig, NoticeLevel, TestKind, TestOptions};

#[tokio::test]
async fn test_autopilot_rolls_pilot_and_sneaking() {
    common::init_logging();
    let harness = TestHarness::new();
    let drone = harness.add_document(sample_drone("autopilot")).await;
    let item = sample_action_item("Stay Hidden", TestKind::DroneInfiltration);

    let mut test = harness
        .factory
        .from_item(item.clone(), Some(drone.clone()), TestOptions::default())
        .unwrap();
    assert_eq!(test.kind(), TestKind::DroneInfiltration);
    assert_eq!(test.data.source_item_handle.as_ref(), Some(&item.handle));
    assert_eq!(test.data.action.skill.as_deref(), Some("sneaking"));

    harness.dice.push_hits(4);
    test.execute().await.unwrap();

    assert_pool(&test, 6);
    assert_eq!(test.data.limit_value(), 2);
    // Sensor 2 caps the four hits.
    assert_hits(&test, 2);
    assert_eq!(harness.dialog.templates(), vec!["success-test-dialog"]);
}

#[tokio::test]
async fn test_rigged_drone_rolls_perception() {
    let harness = TestHarness::with_config(EngineConfig::default().with_dialogs(false));
    let drone = sample_drone("manual");
    let item = sample_action_item("Stay Hidden", TestKind::DroneInfiltration);

    let mut test = harness
        .factory
        .from_item(item, Some(drone), TestOptions::default())
        .unwrap();
    test.prepare().await.unwrap();

    assert_eq!(test.data.action.attribute.as_deref(), Some("sensor"));
    assert_eq!(test.data.action.skill.as_deref(), Some("perception"));
    assert_pool(&test, 5);
    assert!(harness.dialog.templates().is_empty());
}

#[tokio::test]
async fn test_non_vehicle_actor_gets_an_empty_action() {
    common::init_logging();
    let harness = TestHarness::new();
    let item = sample_action_item("Stay Hidden", TestKind::DroneInfiltration);

    let mut test = harness
        .factory
        .from_item(item, Some(sample_summoner("Ada")), TestOptions::default())
        .unwrap();

    assert_notice(&test, NoticeLevel::Error, "is not a vehicle");
    assert_eq!(test.kind(), TestKind::DroneInfiltration);
    assert!(test.data.action.skill.is_none());
    assert!(test.data.action.attribute.is_none());

    test.prepare().await.unwrap();
    assert_pool(&test, 0);
}

#[test]
fn test_item_without_actor_keeps_its_action() {
    let harness = TestHarness::new();
    let item = sample_action_item("Stay Hidden", TestKind::DroneInfiltration);

    let test = harness
        .factory
        .from_item(item, None, TestOptions::without_dialog())
        .unwrap();
    assert!(test.notices().is_empty());
    assert_eq!(test.data.action.test.as_deref(), Some("DroneInfiltrationTest"));
}
