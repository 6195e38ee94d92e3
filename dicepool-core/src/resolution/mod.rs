//! Test resolution.
//!
//! A [`Test`] is the unit of dice pool resolution. It moves through
//!
//! ```text
//! Created -> Prepared -> (AwaitingUserInput) -> Validated -> Executed -> Resolved
//! ```
//!
//! and can be cancelled before it has been rolled. Behavior that differs per
//! kind of test is dispatched on [`TestKind`] at a handful of named stages:
//! document population, base values, validation, result processing and
//! follow-up chaining.
//!
//! Only construction-time contract violations and calls in the wrong state
//! are returned as errors. Everything else (missing documents, store
//! failures, questionable values) is logged and recorded as a [`Notice`].

mod context;
mod data;
mod drain;
mod drone;
mod summoning;

pub use context::{
    DialogOutcome, SkipDialog, TestContext, TestDialog, TestDocuments, TestOptions,
};
pub use data::{
    base_data, drain_data, opposed_data, opposed_summon_data, prepare_data, summon_data,
    ActionData, DamageData, DamageKind, DataStage, TestData, TestKind, SPIRIT_TYPES,
};
pub use drain::{resisted_drain, DEFAULT_DRAIN_ATTRIBUTE};
pub use drone::{infiltration_action, DroneError};
pub use summoning::{
    drain_damage_kind, spirit_name, spirit_services, summoner_magic, summoner_of,
    summoning_drain,
};

use crate::dice::DicePoolRoll;
use crate::document::{Document, DocumentHandle};
use crate::factory::resolve_test_class;
use crate::modifiers::ValueField;
use crate::values::ValueResolver;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that stop a test from being built or advanced.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("{test} can only oppose {expected} but is opposing a {found}")]
    WrongAgainst {
        test: TestKind,
        expected: TestKind,
        found: TestKind,
    },

    #[error("{0} needs a test to oppose")]
    MissingAgainst(TestKind),

    #[error("Can't {operation} a test that is {state}")]
    InvalidState {
        operation: &'static str,
        state: TestState,
    },

    #[error("Unknown test: {0}")]
    UnknownKind(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

/// Where a test is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    Created,
    Prepared,
    AwaitingUserInput,
    Validated,
    Executed,
    Resolved(Outcome),
    Cancelled,
}

impl TestState {
    /// Only tests that haven't been rolled can be cancelled.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            TestState::Created
                | TestState::Prepared
                | TestState::AwaitingUserInput
                | TestState::Validated
        )
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestState::Created => write!(f, "created"),
            TestState::Prepared => write!(f, "prepared"),
            TestState::AwaitingUserInput => write!(f, "awaiting user input"),
            TestState::Validated => write!(f, "validated"),
            TestState::Executed => write!(f, "executed"),
            TestState::Resolved(Outcome::Success) => write!(f, "resolved (success)"),
            TestState::Resolved(Outcome::Failure) => write!(f, "resolved (failure)"),
            TestState::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A non-fatal message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

// ============================================================================
// Test
// ============================================================================

/// A dice pool test and everything it acts on.
#[derive(Debug, Clone)]
pub struct Test {
    pub data: TestData,
    pub documents: TestDocuments,
    pub options: TestOptions,
    /// The test this one opposes.
    pub against: Option<Box<Test>>,
    kind: TestKind,
    state: TestState,
    notices: Vec<Notice>,
    follow_up: Option<Box<Test>>,
    ctx: Arc<TestContext>,
}

impl Test {
    pub fn new(
        kind: TestKind,
        data: TestData,
        documents: TestDocuments,
        options: TestOptions,
        ctx: Arc<TestContext>,
    ) -> Result<Self, TestError> {
        Self::build(kind, data, documents, options, None, ctx)
    }

    /// Build a test opposing `against`.
    pub fn with_against(
        kind: TestKind,
        data: TestData,
        documents: TestDocuments,
        options: TestOptions,
        against: Test,
        ctx: Arc<TestContext>,
    ) -> Result<Self, TestError> {
        Self::build(kind, data, documents, options, Some(Box::new(against)), ctx)
    }

    /// Rebuild a test (and the test it opposes) from its serialized record.
    ///
    /// Documents are resolved from the record's handles when the test is prepared.
    pub fn from_record(data: TestData, ctx: Arc<TestContext>) -> Result<Self, TestError> {
        let kind = data.kind.unwrap_or_default();
        Self::build(
            kind,
            data,
            TestDocuments::default(),
            TestOptions::default(),
            None,
            ctx,
        )
    }

    fn build(
        kind: TestKind,
        mut data: TestData,
        mut documents: TestDocuments,
        options: TestOptions,
        mut against: Option<Box<Test>>,
        ctx: Arc<TestContext>,
    ) -> Result<Self, TestError> {
        if kind.creates_actor() {
            // The acting document is created during execution; whatever the
            // caller selected is not it.
            documents.actor = None;
            data.source_actor_handle = data.summoned_spirit_handle.clone();
        }

        let embedded = data.against.take();
        if against.is_none() {
            if let Some(record) = embedded {
                against = Some(Box::new(Test::from_record(*record, Arc::clone(&ctx))?));
            }
        }

        if let Some(expected) = kind.expected_against() {
            match &against {
                None => return Err(TestError::MissingAgainst(kind)),
                Some(found) if found.kind != expected => {
                    return Err(TestError::WrongAgainst {
                        test: kind,
                        expected,
                        found: found.kind,
                    })
                }
                Some(_) => {}
            }
        }
        data.against = against.as_ref().map(|a| Box::new(a.record()));

        if data.source_actor_handle.is_none() {
            data.source_actor_handle = documents.actor.as_ref().map(|a| a.handle.clone());
        }
        if data.source_item_handle.is_none() {
            data.source_item_handle = documents.item.as_ref().map(|i| i.handle.clone());
        }

        let data = prepare_data(kind, data);
        let state = match data.outcome {
            Some(outcome) => TestState::Resolved(outcome),
            None if data.is_rolled() => TestState::Executed,
            None => TestState::Created,
        };
        tracing::debug!(test = %kind, %state, "Built test");

        Ok(Self {
            data,
            documents,
            options,
            against,
            kind,
            state,
            notices: Vec::new(),
            follow_up: None,
            ctx,
        })
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn state(&self) -> TestState {
        self.state
    }

    pub fn context(&self) -> &Arc<TestContext> {
        &self.ctx
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// The follow-up test run after this one, if any ran.
    pub fn follow_up(&self) -> Option<&Test> {
        self.follow_up.as_deref()
    }

    pub fn actor(&self) -> Option<&Document> {
        self.documents.actor.as_ref()
    }

    pub fn item(&self) -> Option<&Document> {
        self.documents.item.as_ref()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.state {
            TestState::Resolved(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// User-facing result text once resolved.
    pub fn outcome_label(&self) -> Option<&'static str> {
        self.outcome().map(|outcome| match outcome {
            Outcome::Success => self.kind.success_label(),
            Outcome::Failure => self.kind.failure_label(),
        })
    }

    /// Hits that count for success: accumulated hits for extended tests.
    pub fn total_hits(&self) -> i32 {
        if self.data.extended.unwrap_or(false) {
            self.data.extended_hits_value()
        } else {
            self.data.hits_value()
        }
    }

    /// Whether the rolled hits make this test a success.
    ///
    /// Opposed tests succeed when they match or beat the test they oppose.
    pub fn is_success(&self) -> bool {
        let hits = self.total_hits();
        if self.kind.is_opposed() {
            if let Some(against) = &self.against {
                return hits >= against.total_hits();
            }
        }
        let threshold = self.data.threshold_value();
        if threshold > 0 {
            hits >= threshold
        } else {
            hits > 0
        }
    }

    /// Whether the follow-up runs on its own after resolution.
    ///
    /// Tests that are opposed, or that are the opposing side, leave it to the caller.
    pub fn auto_execute_follow_up(&self) -> bool {
        !self.kind.is_opposed() && self.data.action.opposed.is_none()
    }

    /// Labels of the follow-up actions a user can trigger from this test.
    pub fn follow_up_labels(&self) -> Vec<&'static str> {
        let action = match (&self.against, self.kind.is_opposed()) {
            (Some(against), true) => &against.data.action,
            _ => &self.data.action,
        };
        action
            .followed
            .as_deref()
            .and_then(resolve_test_class)
            .map(|kind| vec![kind.label()])
            .unwrap_or_default()
    }

    /// The serializable record, with the opposed test embedded.
    pub fn record(&self) -> TestData {
        let mut data = self.data.clone();
        data.against = self.against.as_ref().map(|a| Box::new(a.record()));
        data
    }

    pub fn to_json(&self) -> Result<serde_json::Value, TestError> {
        Ok(serde_json::to_value(self.record())?)
    }

    pub(crate) fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn expect_state(&self, operation: &'static str, allowed: &[TestState]) -> Result<(), TestError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TestError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Run the whole test: prepare, ask the user, roll and resolve.
    ///
    /// Returns the final state, which is `Cancelled` when the user backs out.
    pub async fn execute(&mut self) -> Result<TestState, TestError> {
        self.prepare().await?;
        if !self.prompt().await? {
            return Ok(self.state);
        }
        self.roll()?;
        self.resolve().await?;
        Ok(self.state)
    }

    /// Resolve documents and calculate pool, limit and threshold.
    pub async fn prepare(&mut self) -> Result<(), TestError> {
        self.expect_state("prepare", &[TestState::Created])?;

        if let Some(against) = self.against.as_mut() {
            against.populate_base_documents().await;
        }
        self.populate_documents().await;
        self.apply_value_sources().await;
        self.prepare_base_values();
        self.calculate();

        self.state = TestState::Prepared;
        tracing::debug!(
            test = %self.kind,
            pool = self.data.pool_value(),
            limit = self.data.limit_value(),
            threshold = self.data.threshold_value(),
            "Prepared test"
        );
        Ok(())
    }

    /// Show the dialog (when enabled) and validate.
    ///
    /// Returns `false` when the user cancelled.
    pub async fn prompt(&mut self) -> Result<bool, TestError> {
        self.expect_state("prompt", &[TestState::Prepared])?;

        if self.options.show_dialog && self.ctx.config.show_dialogs {
            self.state = TestState::AwaitingUserInput;
            let dialog = Arc::clone(&self.ctx.dialog);
            let outcome = dialog
                .prompt(self.kind.dialog_template(), self.data.clone())
                .await;

            match outcome {
                DialogOutcome::Cancelled => {
                    self.cancel().await?;
                    return Ok(false);
                }
                DialogOutcome::Submitted(data) => {
                    self.data = prepare_data(self.kind, data);
                    self.prepare_base_values();
                    self.calculate();
                }
            }
        }

        self.validate_base_values();
        self.state = TestState::Validated;
        Ok(true)
    }

    /// Roll the finalized pool.
    pub fn roll(&mut self) -> Result<(), TestError> {
        self.expect_state("roll", &[TestState::Validated])?;

        let mut extended = self.data.extended.unwrap_or(false);
        if extended && !self.kind.can_be_extended() {
            tracing::debug!(test = %self.kind, "Test can't be extended");
            self.data.extended = Some(false);
            extended = false;
        }

        let limit = self.data.limit_value();
        let threshold = self.data.threshold_value();
        let apply_limits = self.ctx.config.apply_limits;
        let count = |roll: &DicePoolRoll| -> i32 {
            let hits = if apply_limits {
                roll.limited_hits(limit)
            } else {
                roll.hits
            };
            hits as i32
        };

        let mut pool = self.data.pool_value();
        let mut total = 0;
        let last = loop {
            let roll = DicePoolRoll::roll_with(pool, self.ctx.dice.as_ref());
            total += count(&roll);
            tracing::debug!(test = %self.kind, pool, roll = %roll, "Rolled dice");

            let threshold_met = threshold > 0 && total >= threshold;
            if !extended || threshold_met || pool <= 1 {
                break roll;
            }
            pool -= 1;
        };

        let hits = count(&last);
        self.data.hits = Some(ValueField::new(hits));
        self.data.extended_hits = Some(ValueField::new(total));
        self.data.glitched = Some(last.glitch);
        self.data.critical_glitched = Some(last.critical_glitch);
        self.data.dice = last.dice;

        if last.critical_glitch {
            self.notify(Notice::warning("Critical glitch!"));
        } else if last.glitch {
            self.notify(Notice::warning("Glitch!"));
        }

        self.state = TestState::Executed;
        tracing::info!(test = %self.kind, hits, total, "Test rolled");
        Ok(())
    }

    /// Branch into success or failure handling and, if automatic, run the follow-up.
    pub async fn resolve(&mut self) -> Result<Outcome, TestError> {
        self.expect_state("resolve", &[TestState::Executed])?;

        self.process_results();
        let outcome = if self.is_success() {
            self.process_success().await;
            Outcome::Success
        } else {
            self.process_failure().await;
            Outcome::Failure
        };
        self.data.outcome = Some(outcome);
        self.state = TestState::Resolved(outcome);
        tracing::info!(test = %self.kind, ?outcome, hits = self.total_hits(), "Test resolved");

        if self.auto_execute_follow_up() {
            self.execute_follow_up_test().await?;
        }
        Ok(outcome)
    }

    /// Cancel a test that hasn't been rolled, removing anything it created.
    pub async fn cancel(&mut self) -> Result<(), TestError> {
        if !self.state.is_cancellable() {
            return Err(TestError::InvalidState {
                operation: "cancel",
                state: self.state,
            });
        }
        if self.kind == TestKind::OpposedSummonSpirit {
            self.cleanup_summoned_spirit().await;
        }
        self.state = TestState::Cancelled;
        tracing::info!(test = %self.kind, "Test cancelled");
        Ok(())
    }

    /// Run whatever follows this test. Only resolved tests have a follow-up.
    ///
    /// Opposed summoning hands its hits to the summoning test, which then runs
    /// its own follow-up (drain). Every other kind runs its action's followed test.
    pub fn execute_follow_up_test(&mut self) -> BoxFuture<'_, Result<(), TestError>> {
        Box::pin(async move {
            self.expect_state(
                "follow up",
                &[
                    TestState::Resolved(Outcome::Success),
                    TestState::Resolved(Outcome::Failure),
                ],
            )?;
            match self.kind {
                TestKind::OpposedSummonSpirit => self.chain_into_against().await,
                _ => self.run_followed_test().await,
            }
        })
    }

    /// Build the followed test without running it.
    pub fn build_follow_up(&self) -> Result<Option<Test>, TestError> {
        let Some(key) = self.data.action.followed.as_deref() else {
            return Ok(None);
        };
        let kind = resolve_test_class(key).ok_or_else(|| TestError::UnknownKind(key.to_string()))?;

        let mut data = TestData {
            source_actor_handle: self.data.source_actor_handle.clone(),
            ..TestData::default()
        };
        if kind == TestKind::Drain {
            data.drain = self.data.drain;
            data.drain_damage = self.data.drain_damage;
        }

        let documents = TestDocuments::new(self.documents.actor.clone(), None);
        Test::new(kind, data, documents, self.options, Arc::clone(&self.ctx)).map(Some)
    }

    async fn run_followed_test(&mut self) -> Result<(), TestError> {
        let Some(mut follow_up) = self.build_follow_up()? else {
            return Ok(());
        };
        tracing::debug!(test = %self.kind, follow_up = %follow_up.kind, "Running follow-up test");
        follow_up.execute().await?;
        self.follow_up = Some(Box::new(follow_up));
        Ok(())
    }

    // ========================================================================
    // Stages
    // ========================================================================

    async fn populate_documents(&mut self) {
        if self.kind == TestKind::OpposedSummonSpirit {
            if self.data.summoned_spirit_handle.is_none() {
                self.create_summoned_spirit().await;
            }
            match self.data.summoned_spirit_handle.clone() {
                Some(handle) => self.data.source_actor_handle = Some(handle),
                None => return,
            }
        }
        self.populate_base_documents().await;
    }

    /// Resolve actor and item from their handles when they weren't given.
    async fn populate_base_documents(&mut self) {
        if self.documents.actor.is_none() {
            if let Some(handle) = self.data.source_actor_handle.clone() {
                self.documents.actor = self.fetch_document(&handle).await;
            }
        }
        if self.documents.item.is_none() {
            if let Some(handle) = self.data.source_item_handle.clone() {
                self.documents.item = self.fetch_document(&handle).await;
            }
        }
    }

    async fn fetch_document(&mut self, handle: &DocumentHandle) -> Option<Document> {
        let result = self.ctx.store.resolve(handle).await;
        match result {
            Ok(Some(document)) => Some(document),
            Ok(None) => {
                tracing::warn!(%handle, "Test document no longer exists");
                self.notify(Notice::warning(format!("{handle} no longer exists")));
                None
            }
            Err(e) => {
                tracing::error!(error = %e, %handle, "Could not resolve test document");
                self.notify(Notice::error(format!("Could not load {handle}: {e}")));
                None
            }
        }
    }

    /// Apply the context's value sources to the actor's roll data.
    async fn apply_value_sources(&mut self) {
        let Some(actor) = self.documents.actor.clone() else {
            return;
        };
        let ctx = Arc::clone(&self.ctx);
        let Some(sources) = ctx.value_sources_for(&actor.doc_type) else {
            return;
        };

        let mut system = actor.system.clone();
        ValueResolver::new(ctx.store.as_ref())
            .apply_all(&mut system, sources, &actor)
            .await;
        if let Some(actor) = self.documents.actor.as_mut() {
            actor.system = system;
        }
    }

    fn prepare_base_values(&mut self) {
        match self.kind {
            TestKind::OpposedSummonSpirit => self.prepare_opposed_summon_pool(),
            TestKind::SummonSpirit => {
                self.prepare_action_values();
                self.prepare_summon_limit();
            }
            TestKind::Drain => {
                self.prepare_drain_action();
                self.prepare_action_values();
                self.prepare_drain_threshold();
            }
            TestKind::Success | TestKind::DroneInfiltration => self.prepare_action_values(),
        }
    }

    /// Pool and limit from the actor's attributes, skill and condition.
    fn prepare_action_values(&mut self) {
        let action = self.data.action.clone();
        let allow_defaulting = self.ctx.config.allow_defaulting;
        let pool = self.data.pool.get_or_insert_with(|| ValueField::new(0));
        let limit = self.data.limit.get_or_insert_with(|| ValueField::new(0));

        for modifier in &action.dice_pool_mod {
            pool.modifiers.add_unique(modifier.label.clone(), modifier.value);
        }
        for modifier in &action.limit_mod {
            limit.modifiers.add_unique(modifier.label.clone(), modifier.value);
        }

        let Some(actor) = self.documents.actor.as_ref() else {
            return;
        };

        let attribute = action
            .attribute
            .as_deref()
            .map_or(0, |name| attribute_value(actor, name));
        let attribute2 = action
            .attribute2
            .as_deref()
            .map_or(0, |name| attribute_value(actor, name));
        let skill = action.skill.as_deref().map(|name| skill_value(actor, name));

        pool.base = attribute + attribute2 + skill.unwrap_or(0);
        let mut warning = None;
        if skill == Some(0) {
            if allow_defaulting {
                pool.modifiers.add_unique("Defaulting", -1);
            } else {
                pool.base = 0;
                pool.modifiers.remove("Defaulting");
                warning = Some(Notice::warning("Defaulting is disabled; the skill is required"));
            }
        } else {
            pool.modifiers.remove("Defaulting");
        }

        match wound_modifier(actor) {
            0 => pool.modifiers.remove("Wounds"),
            wounds => pool.modifiers.add_unique("Wounds", wounds),
        };

        if let Some(name) = action.limit.as_deref() {
            limit.base = limit_value(actor, name);
        }

        if let Some(notice) = warning {
            self.notify(notice);
        }
    }

    fn calculate(&mut self) {
        for field in [
            &mut self.data.pool,
            &mut self.data.limit,
            &mut self.data.threshold,
        ]
        .into_iter()
        .flatten()
        {
            field.calculate();
        }
    }

    /// Warnings only; nothing here blocks the roll.
    fn validate_base_values(&mut self) {
        if self.data.pool_value() <= 0 {
            tracing::warn!(test = %self.kind, "Empty dice pool");
            self.notify(Notice::warning("There are no dice to roll"));
        }
        if self.kind == TestKind::SummonSpirit {
            self.validate_summon_force();
        }
    }

    fn process_results(&mut self) {
        if self.kind == TestKind::Drain {
            self.apply_drain_damage();
        }
    }

    async fn process_success(&mut self) {
        if self.kind == TestKind::OpposedSummonSpirit {
            self.cleanup_summoned_spirit().await;
        }
    }

    async fn process_failure(&mut self) {
        if self.kind == TestKind::OpposedSummonSpirit {
            self.derive_spirit_services();
            self.finalize_summoned_spirit().await;
        }
    }
}

// ============================================================================
// Actor values
// ============================================================================

/// `attributes.<name>.value`, zero when missing.
pub fn attribute_value(actor: &Document, name: &str) -> i32 {
    actor
        .system_i32(&format!("attributes.{name}.value"))
        .unwrap_or(0)
}

/// `skills.active.<name>.value`, zero when the actor lacks the skill.
pub fn skill_value(actor: &Document, name: &str) -> i32 {
    actor
        .system_i32(&format!("skills.active.{name}.value"))
        .unwrap_or(0)
}

/// `limits.<name>.value`, falling back to an attribute of the same name (vehicles).
pub fn limit_value(actor: &Document, name: &str) -> i32 {
    actor
        .system_i32(&format!("limits.{name}.value"))
        .unwrap_or_else(|| attribute_value(actor, name))
}

/// -1 per three boxes of damage on each condition track.
pub fn wound_modifier(actor: &Document) -> i32 {
    let physical = actor.system_i32("track.physical.value").unwrap_or(0).max(0);
    let stun = actor.system_i32("track.stun.value").unwrap_or(0).max(0);
    -(physical / 3 + stun / 3)
}
