//! Serialized test records and rebuilding tests from them.

mod common;

use dicepool_core::testing::{assert_hits, assert_pool, assert_state, TestHarness};
use dicepool_core::{
    ActionData, Outcome, TestDocuments, TestError, TestKind, TestOptions, TestState,
};
use serde_json::json;

#[tokio::test]
async fn test_opposed_record_embeds_the_summoning() {
    let harness = TestHarness::new();
    let summoner = harness.add_summoner("Ada").await;
    harness.dice.push_hits(4);

    let mut summoning = harness.summoning(&summoner, 4).unwrap();
    summoning.execute().await.unwrap();
    let resistance = harness.factory.opposed_from(&summoning).unwrap().unwrap();

    let record = resistance.to_json().unwrap();
    assert_eq!(record["type"], "OpposedSummonSpiritTest");
    assert_eq!(record["against"]["type"], "SummonSpiritTest");
    assert_eq!(record["against"]["force"], 4);
    assert_eq!(record["against"]["hits"]["value"], 4);
    assert_eq!(
        record["against"]["sourceActorHandle"],
        summoner.handle.as_str()
    );
    assert!(record["summonedSpiritHandle"].is_null());
}

#[tokio::test]
async fn test_rebuilt_resistance_runs_against_the_stored_summoner() {
    common::init_logging();
    let harness = TestHarness::new();
    let summoner = harness.add_summoner("Ada").await;
    harness.dice.push_hits(4);

    let mut summoning = harness.summoning(&summoner, 4).unwrap();
    summoning.execute().await.unwrap();
    let record = harness
        .factory
        .opposed_from(&summoning)
        .unwrap()
        .unwrap()
        .to_json()
        .unwrap();

    // A fresh round trip, as if the record came back from a chat message.
    let mut resistance = harness.factory.from_json(record).unwrap();
    assert_eq!(resistance.kind(), TestKind::OpposedSummonSpirit);
    assert_state(&resistance, TestState::Created);

    let against = resistance.against.as_ref().unwrap();
    assert_eq!(against.kind(), TestKind::SummonSpirit);
    assert_state(against, TestState::Resolved(Outcome::Success));
    assert!(against.actor().is_none());

    harness.dice.push_hits(2);
    harness.dice.push_hits(0);
    let state = resistance.execute().await.unwrap();
    assert_eq!(state, TestState::Resolved(Outcome::Failure));
    assert_pool(&resistance, 4);
    assert_eq!(resistance.data.services, Some(2));

    resistance.execute_follow_up_test().await.unwrap();
    let summoning = resistance.against.as_ref().unwrap();
    assert_eq!(summoning.actor().unwrap().handle, summoner.handle);
    assert_eq!(summoning.data.drain, Some(4));

    let drain = summoning.follow_up().unwrap();
    assert_eq!(drain.kind(), TestKind::Drain);
    assert_pool(drain, 8);
    assert_hits(drain, 0);
}

#[test]
fn test_record_with_the_wrong_opponent_is_rejected() {
    let harness = TestHarness::new();
    let record = json!({
        "type": "OpposedSummonSpiritTest",
        "against": {"type": "DrainTest", "drain": 2},
    });

    let result = harness.factory.from_json(record);
    assert!(matches!(
        result,
        Err(TestError::WrongAgainst {
            test: TestKind::OpposedSummonSpirit,
            expected: TestKind::SummonSpirit,
            found: TestKind::Drain,
        })
    ));
}

#[test]
fn test_opposed_record_without_opponent_is_rejected() {
    let harness = TestHarness::new();
    let result = harness
        .factory
        .from_json(json!({"type": "OpposedSummonSpiritTest"}));
    assert!(matches!(
        result,
        Err(TestError::MissingAgainst(TestKind::OpposedSummonSpirit))
    ));
}

#[tokio::test]
async fn test_resolved_record_cannot_roll_again() {
    let harness = TestHarness::new();
    let record = json!({
        "type": "SuccessTest",
        "pool": {"base": 6, "value": 6},
        "hits": {"base": 3, "value": 3},
        "outcome": "Success",
    });

    let mut test = harness.factory.from_json(record).unwrap();
    assert_state(&test, TestState::Resolved(Outcome::Success));
    assert_hits(&test, 3);
    assert!(matches!(
        test.prepare().await,
        Err(TestError::InvalidState {
            operation: "prepare",
            ..
        })
    ));
    assert!(matches!(
        test.resolve().await,
        Err(TestError::InvalidState {
            operation: "resolve",
            ..
        })
    ));
}

#[tokio::test]
async fn test_resolved_record_keeps_its_follow_up_from_running_twice() {
    let harness = TestHarness::new();
    let summoner = harness.add_summoner("Ada").await;
    let action = ActionData::default()
        .with_skill("charisma", "summoning")
        .with_followed(TestKind::Drain);

    harness.dice.push_hits(2);
    let mut test = harness
        .factory
        .from_action(action, TestDocuments::actor(summoner), TestOptions::default())
        .unwrap();
    test.execute().await.unwrap();
    assert_eq!(test.data.outcome, Some(Outcome::Success));
    assert!(test.follow_up().is_some());

    let record = test.to_json().unwrap();
    assert_eq!(record["outcome"], "Success");

    let mut rebuilt = harness.factory.from_json(record).unwrap();
    assert_state(&rebuilt, TestState::Resolved(Outcome::Success));
    assert!(matches!(
        rebuilt.resolve().await,
        Err(TestError::InvalidState {
            operation: "resolve",
            ..
        })
    ));
    assert_eq!(
        harness.dialog.templates(),
        vec!["success-test-dialog", "drain-test-dialog"]
    );
}

#[test]
fn test_legacy_dependent_handle_is_read() {
    let harness = TestHarness::new();
    let record = json!({
        "type": "OpposedSummonSpiritTest",
        "dependentEntityHandle": "Actor.spirit-1",
        "against": {"type": "SummonSpiritTest", "force": 3},
    });

    let test = harness.factory.from_json(record).unwrap();
    assert_eq!(
        test.data.summoned_spirit_handle.as_ref().map(|h| h.as_str()),
        Some("Actor.spirit-1")
    );
    assert_eq!(
        test.data.source_actor_handle.as_ref().map(|h| h.as_str()),
        Some("Actor.spirit-1")
    );
}
