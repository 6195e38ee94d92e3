//! Dice pool test resolution engine.
//!
//! This crate provides:
//! - Dice pool rolls with hits, limits and glitches
//! - Labeled modifiers for pools, limits and thresholds
//! - Value sources that read one document's values from a linked document
//! - A test state machine with opposed tests, dependent documents and follow-up chains
//! - A factory that builds tests from actions, items and serialized records
//!
//! # Quick Start
//!
//! ```ignore
//! use dicepool_core::{MemoryStore, TestContext, TestFactory, TestDocuments, TestOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let factory = TestFactory::new(Arc::new(TestContext::new(store)));
//!
//!     let mut summoning = factory.from_action(action, TestDocuments::actor(mage), TestOptions::default())?;
//!     summoning.execute().await?;
//!
//!     if let Some(mut resistance) = factory.opposed_from(&summoning)? {
//!         resistance.execute().await?;
//!         resistance.execute_follow_up_test().await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dice;
pub mod document;
pub mod factory;
pub mod modifiers;
pub mod resolution;
pub mod store;
pub mod testing;
pub mod values;

// Primary public API
pub use config::{ConfigError, EngineConfig};
pub use dice::{DicePoolRoll, DiceSource, RandomDice};
pub use document::{Document, DocumentHandle, DocumentKind, DocumentSeed, Ownership, User, UserId};
pub use factory::{resolve_test_class, TestFactory};
pub use modifiers::{Modifier, ModifierList, ValueField};
pub use resolution::{
    ActionData, DialogOutcome, Notice, NoticeLevel, Outcome, Test, TestContext, TestData,
    TestDialog, TestDocuments, TestError, TestKind, TestOptions, TestState,
};
pub use store::{EntityStore, MemoryStore, StaticUsers, StoreError, UserDirectory};
pub use testing::TestHarness;
pub use values::{ValueResolver, ValueSource, ValueSourceError, ValueSources};
