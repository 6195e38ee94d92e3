//! Value sources feeding a test's roll data.

mod common;

use dicepool_core::testing::{assert_pool, TestHarness};
use dicepool_core::{
    ActionData, Document, DocumentSeed, EngineConfig, TestDocuments, TestOptions, ValueSource,
    ValueSources,
};
use serde_json::json;

fn bound_spirit(summoner: &Document) -> Document {
    Document::from_seed(DocumentSeed::actor(
        "Ada Air Spirit",
        "spirit",
        json!({
            "force": 4,
            "summoner": {"handle": summoner.handle.as_str()},
            "attributes": {"magic": {"value": 0}},
        }),
    ))
}

#[tokio::test]
async fn test_spirit_rolls_with_summoner_magic() {
    common::init_logging();
    let sources = ValueSources::parse([("attributes.magic", "@summoner.attributes.magic")]).unwrap();
    let harness = TestHarness::with_config(EngineConfig::default().with_dialogs(false))
        .with_value_sources("spirit", sources);

    let summoner = harness.add_summoner("Ada").await;
    let spirit = harness.add_document(bound_spirit(&summoner)).await;

    let action = ActionData {
        attribute: Some("magic".to_string()),
        ..ActionData::default()
    };
    let mut test = harness
        .factory
        .from_action(action, TestDocuments::actor(spirit), TestOptions::default())
        .unwrap();
    test.prepare().await.unwrap();

    assert_pool(&test, 5);
    assert_eq!(harness.store.lookup_count(), 1);

    let magic = test.actor().unwrap().system_value("attributes.magic").unwrap();
    assert_eq!(magic["source"]["handle"], summoner.handle.as_str());
    assert_eq!(magic["source"]["source"], "@summoner.attributes.magic");

    // Roll data only: the stored spirit is untouched.
    let stored = harness.document(&test.actor().unwrap().handle).await.unwrap();
    assert_eq!(stored.system_i32("attributes.magic.value"), Some(0));
}

#[tokio::test]
async fn test_local_sources_never_touch_the_store() {
    let sources = ValueSources::new().with(
        "attributes.force.value",
        ValueSource::local("system.force"),
    );
    let harness = TestHarness::with_config(EngineConfig::default().with_dialogs(false))
        .with_value_sources("spirit", sources);

    let summoner = harness.add_summoner("Ada").await;
    let spirit = bound_spirit(&summoner);

    let action = ActionData {
        attribute: Some("force".to_string()),
        ..ActionData::default()
    };
    let mut test = harness
        .factory
        .from_action(action, TestDocuments::actor(spirit), TestOptions::default())
        .unwrap();
    test.prepare().await.unwrap();

    assert_pool(&test, 4);
    assert_eq!(harness.store.lookup_count(), 0);
}

#[tokio::test]
async fn test_missing_summoner_leaves_values_alone() {
    common::init_logging();
    let sources = ValueSources::new().with(
        "attributes.magic",
        ValueSource::remote("summoner", "attributes.magic"),
    );
    let harness = TestHarness::with_config(EngineConfig::default().with_dialogs(false))
        .with_value_sources("spirit", sources);

    // The summoner was never stored.
    let summoner = dicepool_core::testing::sample_summoner("Ghost");
    let spirit = bound_spirit(&summoner);

    let action = ActionData {
        attribute: Some("magic".to_string()),
        ..ActionData::default()
    };
    let mut test = harness
        .factory
        .from_action(action, TestDocuments::actor(spirit), TestOptions::default())
        .unwrap();
    test.prepare().await.unwrap();

    assert_pool(&test, 0);
    assert_eq!(
        test.actor().unwrap().system_i32("attributes.magic.value"),
        Some(0)
    );
    // Resolution failures are not test notices.
    assert!(test.notices().is_empty());
}
