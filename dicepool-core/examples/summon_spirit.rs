//! Summon a spirit with real dice: summoning, the spirit's resistance, then drain.
//!
//! Run with `RUST_LOG=dicepool_core=debug` to follow the engine.

use dicepool_core::testing::sample_summoner;
use dicepool_core::{
    ActionData, EngineConfig, MemoryStore, Test, TestContext, TestDocuments, TestFactory,
    TestKind, TestOptions,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Summoning a Spirit ===\n");

    let store = Arc::new(MemoryStore::new());
    let summoner = sample_summoner("Ada");
    store.insert(summoner.clone()).await;

    let ctx = TestContext::new(store.clone()).with_config(EngineConfig::new().with_dialogs(false));
    let factory = TestFactory::new(Arc::new(ctx));

    let mut summoning = factory.from_action(
        ActionData::default().with_test(TestKind::SummonSpirit),
        TestDocuments::actor(summoner),
        TestOptions::default(),
    )?;
    summoning.data.force = Some(4);
    summoning.execute().await?;
    report(&summoning);

    let Some(mut resistance) = factory.opposed_from(&summoning)? else {
        return Ok(());
    };
    resistance.execute().await?;
    report(&resistance);

    if let Some(services) = resistance.data.services {
        println!("Services owed: {services}");
    }

    resistance.execute_follow_up_test().await?;
    if let Some(drain) = resistance.against.as_ref().and_then(|a| a.follow_up()) {
        report(drain);
        if let Some(damage) = drain.data.drain_damage {
            println!("Damage taken: {} {:?}", damage.value, damage.kind);
        }
    }

    println!("\nDocuments in store: {}", store.len().await);
    Ok(())
}

fn report(test: &Test) {
    println!(
        "{}: pool {}, limit {}, hits {} -> {}",
        test.kind().label(),
        test.data.pool_value(),
        test.data.limit_value(),
        test.total_hits(),
        test.outcome_label().unwrap_or("unresolved"),
    );
    for notice in test.notices() {
        println!("  [{:?}] {}", notice.level, notice.message);
    }
}
