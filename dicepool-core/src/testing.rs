//! Testing utilities for the resolution engine.
//!
//! This module provides tools for integration testing:
//! - `ScriptedDice` and `ScriptedDialog` for deterministic rolls and user input
//! - `TestHarness` bundling an in-memory store, users and a factory
//! - Sample documents and assertion helpers for verifying test state

use crate::config::EngineConfig;
use crate::dice::DiceSource;
use crate::document::{Document, DocumentHandle, DocumentSeed, User};
use crate::factory::TestFactory;
use crate::resolution::{
    DialogOutcome, NoticeLevel, Outcome, Test, TestContext, TestData, TestDialog, TestDocuments,
    TestError, TestKind, TestOptions, TestState,
};
use crate::store::{MemoryStore, StaticUsers};
use crate::values::ValueSources;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Face used for dice that are neither hits nor ones.
const MISS_FACE: u8 = 3;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// Scripted dice
// ============================================================================

/// One scripted roll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRoll {
    /// This many sixes (capped at the pool), the rest misses.
    Hits(u32),
    /// Exact faces, truncated or padded with misses to the pool size.
    Faces(Vec<u8>),
}

/// Dice that return scripted results in order.
///
/// Once the script runs out every die is a miss.
#[derive(Debug, Default)]
pub struct ScriptedDice {
    script: Mutex<VecDeque<ScriptedRoll>>,
}

impl ScriptedDice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a sequence of hit counts.
    pub fn hits(hits: impl IntoIterator<Item = u32>) -> Self {
        Self {
            script: Mutex::new(hits.into_iter().map(ScriptedRoll::Hits).collect()),
        }
    }

    pub fn push_hits(&self, hits: u32) {
        lock(&self.script).push_back(ScriptedRoll::Hits(hits));
    }

    pub fn push_faces(&self, faces: Vec<u8>) {
        lock(&self.script).push_back(ScriptedRoll::Faces(faces));
    }

    /// Scripted rolls not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

impl DiceSource for ScriptedDice {
    fn roll_d6(&self, count: usize) -> Vec<u8> {
        let mut faces = match lock(&self.script).pop_front() {
            Some(ScriptedRoll::Hits(hits)) => vec![6; (hits as usize).min(count)],
            Some(ScriptedRoll::Faces(faces)) => faces,
            None => Vec::new(),
        };
        faces.resize(count, MISS_FACE);
        faces
    }
}

// ============================================================================
// Scripted dialog
// ============================================================================

/// Edits applied to the data shown in a dialog.
pub type DialogEdit = Box<dyn Fn(&mut TestData) + Send + Sync>;

/// One scripted user reaction to a dialog.
pub enum DialogStep {
    Accept,
    Cancel,
    Edit(DialogEdit),
}

impl DialogStep {
    pub fn edit(f: impl Fn(&mut TestData) + Send + Sync + 'static) -> Self {
        DialogStep::Edit(Box::new(f))
    }
}

/// A dialog that reacts as scripted and remembers what it was shown.
///
/// Once the script runs out every dialog is accepted unchanged.
#[derive(Default)]
pub struct ScriptedDialog {
    steps: Mutex<VecDeque<DialogStep>>,
    shown: Mutex<Vec<(String, TestData)>>,
}

impl ScriptedDialog {
    pub fn new(steps: Vec<DialogStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, step: DialogStep) {
        lock(&self.steps).push_back(step);
    }

    /// Templates shown so far, in order.
    pub fn templates(&self) -> Vec<String> {
        lock(&self.shown).iter().map(|(t, _)| t.clone()).collect()
    }

    /// Data shown so far, in order.
    pub fn shown(&self) -> Vec<TestData> {
        lock(&self.shown).iter().map(|(_, d)| d.clone()).collect()
    }
}

#[async_trait]
impl TestDialog for ScriptedDialog {
    async fn prompt(&self, template: &str, mut data: TestData) -> DialogOutcome {
        lock(&self.shown).push((template.to_string(), data.clone()));
        let step = lock(&self.steps).pop_front();
        match step {
            None | Some(DialogStep::Accept) => DialogOutcome::Submitted(data),
            Some(DialogStep::Cancel) => DialogOutcome::Cancelled,
            Some(DialogStep::Edit(edit)) => {
                edit(&mut data);
                DialogOutcome::Submitted(data)
            }
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Everything needed to run tests against in-memory collaborators.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub users: Arc<StaticUsers>,
    pub dice: Arc<ScriptedDice>,
    pub dialog: Arc<ScriptedDialog>,
    pub factory: TestFactory,
}

impl TestHarness {
    /// A harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let users = Arc::new(StaticUsers::default());
        let dice = Arc::new(ScriptedDice::new());
        let dialog = Arc::new(ScriptedDialog::default());

        let ctx = TestContext::new(store.clone())
            .with_users(users.clone())
            .with_dice(dice.clone())
            .with_dialog(dialog.clone())
            .with_config(config);

        Self {
            store,
            users,
            dice,
            dialog,
            factory: TestFactory::new(Arc::new(ctx)),
        }
    }

    /// Register value sources for a document type.
    pub fn with_value_sources(mut self, doc_type: &str, sources: ValueSources) -> Self {
        let ctx = TestContext::clone(self.factory.context()).with_value_sources(doc_type, sources);
        self.factory = TestFactory::new(Arc::new(ctx));
        self
    }

    pub fn ctx(&self) -> &Arc<TestContext> {
        self.factory.context()
    }

    /// Store a document and hand it back.
    pub async fn add_document(&self, document: Document) -> Document {
        self.store.insert(document.clone()).await;
        document
    }

    /// Store a sample summoner.
    pub async fn add_summoner(&self, name: &str) -> Document {
        self.add_document(sample_summoner(name)).await
    }

    /// Add a player whose main character is `character`.
    pub fn add_player(&self, id: &str, character: &Document) {
        self.users
            .add(User::player(id, Some(character.handle.clone())));
    }

    /// Add a game master who also plays `character`.
    pub fn add_game_master(&self, id: &str, character: &Document) {
        self.users
            .add(User::game_master(id).with_character(character.handle.clone()));
    }

    /// Current store state of a document, without counting a lookup.
    pub async fn document(&self, handle: &DocumentHandle) -> Option<Document> {
        self.store.peek(handle).await
    }

    /// A summoning test for `summoner` at `force`.
    pub fn summoning(&self, summoner: &Document, force: i32) -> Result<Test, TestError> {
        let data = TestData {
            force: Some(force),
            ..TestData::default()
        };
        Test::new(
            TestKind::SummonSpirit,
            data,
            TestDocuments::actor(summoner.clone()),
            TestOptions::default(),
            Arc::clone(self.ctx()),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Sample documents
// ============================================================================

/// A hermetic mage: Magic 5, Summoning 5, Willpower 4, Logic 4.
pub fn sample_summoner(name: &str) -> Document {
    Document::from_seed(DocumentSeed::actor(
        name,
        "character",
        json!({
            "attributes": {
                "magic": {"base": 5, "value": 5},
                "willpower": {"base": 4, "value": 4},
                "logic": {"base": 4, "value": 4},
                "charisma": {"base": 3, "value": 3},
            },
            "skills": {"active": {"summoning": {"value": 5, "attribute": "magic"}}},
            "limits": {"astral": {"value": 6}},
            "track": {"physical": {"value": 0}, "stun": {"value": 0}},
        }),
    ))
}

/// A small surveillance drone in the given control mode (`autopilot`, `manual`, ...).
pub fn sample_drone(control_mode: &str) -> Document {
    Document::from_seed(DocumentSeed::actor(
        "Fly-Spy",
        "vehicle",
        json!({
            "controlMode": control_mode,
            "attributes": {
                "pilot": {"value": 3},
                "sensor": {"value": 2},
            },
            "skills": {"active": {
                "sneaking": {"value": 3},
                "perception": {"value": 3, "attribute": "sensor"},
            }},
        }),
    ))
}

/// An item whose action rolls `kind`.
pub fn sample_action_item(name: &str, kind: TestKind) -> Document {
    Document::from_seed(DocumentSeed::item(
        name,
        "action",
        json!({"action": {"test": kind.key()}}),
    ))
}

// ============================================================================
// Assertions
// ============================================================================

/// Assert a test is in the given state.
#[track_caller]
pub fn assert_state(test: &Test, state: TestState) {
    assert_eq!(
        test.state(),
        state,
        "Expected {} to be {state}, but it is {}",
        test.kind(),
        test.state()
    );
}

/// Assert a test resolved with the given outcome.
#[track_caller]
pub fn assert_outcome(test: &Test, outcome: Outcome) {
    assert_state(test, TestState::Resolved(outcome));
}

/// Assert the effective pool size.
#[track_caller]
pub fn assert_pool(test: &Test, pool: i32) {
    let actual = test.data.pool_value();
    assert_eq!(actual, pool, "Expected a pool of {pool}, got {actual}");
}

/// Assert the rolled hits.
#[track_caller]
pub fn assert_hits(test: &Test, hits: i32) {
    let actual = test.data.hits_value();
    assert_eq!(actual, hits, "Expected {hits} hits, got {actual}");
}

/// Assert a notice of `level` mentioning `text` was raised.
#[track_caller]
pub fn assert_notice(test: &Test, level: NoticeLevel, text: &str) {
    assert!(
        test.notices()
            .iter()
            .any(|n| n.level == level && n.message.contains(text)),
        "Expected a {level:?} notice containing '{text}', got {:?}",
        test.notices()
    );
}

/// Assert no error notices were raised.
#[track_caller]
pub fn assert_no_errors(test: &Test) {
    let errors: Vec<_> = test
        .notices()
        .iter()
        .filter(|n| n.level == NoticeLevel::Error)
        .collect();
    assert!(errors.is_empty(), "Expected no errors, got {errors:?}");
}
