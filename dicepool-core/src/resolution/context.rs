//! Everything a test needs from the outside world.

use super::data::TestData;
use crate::config::EngineConfig;
use crate::dice::{DiceSource, RandomDice};
use crate::document::Document;
use crate::store::{EntityStore, StaticUsers, UserDirectory};
use crate::values::ValueSources;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Result of showing a test dialog.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogOutcome {
    /// The user confirmed, possibly after editing the data.
    Submitted(TestData),
    Cancelled,
}

/// Renders a test dialog and waits for the user.
#[async_trait]
pub trait TestDialog: Send + Sync {
    async fn prompt(&self, template: &str, data: TestData) -> DialogOutcome;
}

/// Dialog that confirms immediately without changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipDialog;

#[async_trait]
impl TestDialog for SkipDialog {
    async fn prompt(&self, _template: &str, data: TestData) -> DialogOutcome {
        DialogOutcome::Submitted(data)
    }
}

/// Shared collaborators and settings for running tests.
#[derive(Clone)]
pub struct TestContext {
    pub store: Arc<dyn EntityStore>,
    pub users: Arc<dyn UserDirectory>,
    pub dialog: Arc<dyn TestDialog>,
    pub dice: Arc<dyn DiceSource>,
    pub config: EngineConfig,
    /// Value sources applied to an actor's roll data, keyed by document type.
    value_sources: HashMap<String, ValueSources>,
}

impl TestContext {
    /// A context with no users, no dialog and real dice.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            users: Arc::new(StaticUsers::default()),
            dialog: Arc::new(SkipDialog),
            dice: Arc::new(RandomDice::new()),
            config: EngineConfig::default(),
            value_sources: HashMap::new(),
        }
    }

    pub fn with_users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = users;
        self
    }

    pub fn with_dialog(mut self, dialog: Arc<dyn TestDialog>) -> Self {
        self.dialog = dialog;
        self
    }

    pub fn with_dice(mut self, dice: Arc<dyn DiceSource>) -> Self {
        self.dice = dice;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register value sources for documents of `doc_type`.
    pub fn with_value_sources(mut self, doc_type: impl Into<String>, sources: ValueSources) -> Self {
        self.value_sources.insert(doc_type.into(), sources);
        self
    }

    pub fn value_sources_for(&self, doc_type: &str) -> Option<&ValueSources> {
        self.value_sources.get(doc_type)
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("config", &self.config)
            .field("value_sources", &self.value_sources)
            .finish_non_exhaustive()
    }
}

/// Documents a test acts with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestDocuments {
    pub actor: Option<Document>,
    pub item: Option<Document>,
}

impl TestDocuments {
    pub fn new(actor: Option<Document>, item: Option<Document>) -> Self {
        Self { actor, item }
    }

    pub fn actor(actor: Document) -> Self {
        Self {
            actor: Some(actor),
            item: None,
        }
    }
}

/// Per-test options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestOptions {
    /// Ask the dialog collaborator before rolling.
    pub show_dialog: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self { show_dialog: true }
    }
}

impl TestOptions {
    pub fn without_dialog() -> Self {
        Self { show_dialog: false }
    }
}
