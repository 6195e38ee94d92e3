//! Test records and the data stages that fill them.
//!
//! Every field of a [`TestData`] that matters to resolution is optional: only
//! an absent (or `null`) field counts as unset, so `0` and `false` survive
//! preparation. Stages are plain `fn(TestData) -> TestData` composed per
//! [`TestKind`]; each only fills what is still unset, which keeps
//! [`prepare_data`] idempotent.

use super::Outcome;
use crate::document::{Document, DocumentHandle};
use crate::modifiers::{ModifierList, ValueField};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Spirit types a summoner can choose from. The first is preselected.
pub const SPIRIT_TYPES: &[&str] = &[
    "air", "earth", "fire", "water", "man", "beasts", "guardian", "guidance", "plant", "task",
];

/// A pipeline stage over test data.
pub type DataStage = fn(TestData) -> TestData;

// ============================================================================
// Test kinds
// ============================================================================

/// The kinds of test the engine knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TestKind {
    #[default]
    #[serde(rename = "SuccessTest")]
    Success,
    #[serde(rename = "SummonSpiritTest")]
    SummonSpirit,
    #[serde(rename = "OpposedSummonSpiritTest")]
    OpposedSummonSpirit,
    #[serde(rename = "DrainTest")]
    Drain,
    #[serde(rename = "DroneInfiltrationTest")]
    DroneInfiltration,
}

impl TestKind {
    pub const ALL: [TestKind; 5] = [
        TestKind::Success,
        TestKind::SummonSpirit,
        TestKind::OpposedSummonSpirit,
        TestKind::Drain,
        TestKind::DroneInfiltration,
    ];

    /// Key used in action descriptors and serialized records.
    pub fn key(&self) -> &'static str {
        match self {
            TestKind::Success => "SuccessTest",
            TestKind::SummonSpirit => "SummonSpiritTest",
            TestKind::OpposedSummonSpirit => "OpposedSummonSpiritTest",
            TestKind::Drain => "DrainTest",
            TestKind::DroneInfiltration => "DroneInfiltrationTest",
        }
    }

    /// Human-readable name, used as the default title.
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::Success => "Success Test",
            TestKind::SummonSpirit => "Summon Spirit",
            TestKind::OpposedSummonSpirit => "Resist Summoning",
            TestKind::Drain => "Drain",
            TestKind::DroneInfiltration => "Drone Infiltration",
        }
    }

    /// Dialog template the dialog collaborator should render.
    pub fn dialog_template(&self) -> &'static str {
        match self {
            TestKind::SummonSpirit => "summonspirit-test-dialog",
            TestKind::OpposedSummonSpirit => "opposed-test-dialog",
            TestKind::Drain => "drain-test-dialog",
            TestKind::Success | TestKind::DroneInfiltration => "success-test-dialog",
        }
    }

    pub fn can_be_extended(&self) -> bool {
        !matches!(
            self,
            TestKind::SummonSpirit | TestKind::OpposedSummonSpirit | TestKind::Drain
        )
    }

    /// Opposed kinds compare their hits against another test.
    pub fn is_opposed(&self) -> bool {
        matches!(self, TestKind::OpposedSummonSpirit)
    }

    /// The kind this kind must oppose, if it is opposed.
    pub fn expected_against(&self) -> Option<TestKind> {
        match self {
            TestKind::OpposedSummonSpirit => Some(TestKind::SummonSpirit),
            _ => None,
        }
    }

    /// Kinds whose acting document is created during execution.
    pub fn creates_actor(&self) -> bool {
        matches!(self, TestKind::OpposedSummonSpirit)
    }

    /// Result text when the test itself succeeds.
    pub fn success_label(&self) -> &'static str {
        match self {
            TestKind::OpposedSummonSpirit => "The spirit resists the summoning",
            TestKind::Drain => "Drain resisted",
            _ => "Success",
        }
    }

    /// Result text when the test itself fails.
    pub fn failure_label(&self) -> &'static str {
        match self {
            TestKind::OpposedSummonSpirit => "The spirit has been summoned",
            TestKind::Drain => "Drain taken",
            _ => "Failure",
        }
    }

    /// Data stages run by [`prepare_data`], in order.
    pub fn data_stages(&self) -> &'static [DataStage] {
        const BASE: &[DataStage] = &[base_data];
        const SUMMON: &[DataStage] = &[base_data, summon_data];
        const OPPOSED_SUMMON: &[DataStage] = &[base_data, opposed_data, opposed_summon_data];
        const DRAIN: &[DataStage] = &[base_data, drain_data];

        match self {
            TestKind::Success | TestKind::DroneInfiltration => BASE,
            TestKind::SummonSpirit => SUMMON,
            TestKind::OpposedSummonSpirit => OPPOSED_SUMMON,
            TestKind::Drain => DRAIN,
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

// ============================================================================
// Records
// ============================================================================

/// What a test rolls, as described by an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionData {
    /// Test kind key to roll.
    pub test: Option<String>,
    /// Test kind key to run once this one is done.
    pub followed: Option<String>,
    /// Test kind key an opponent rolls against this one.
    pub opposed: Option<String>,
    pub attribute: Option<String>,
    pub attribute2: Option<String>,
    pub skill: Option<String>,
    pub limit: Option<String>,
    pub threshold: Option<i32>,
    pub dice_pool_mod: ModifierList,
    pub limit_mod: ModifierList,
    pub extended: Option<bool>,
}

impl ActionData {
    /// The action stored on an item under `system.action`, if any.
    pub fn from_item(item: &Document) -> Option<Self> {
        item.system_value("action")
            .and_then(|action| serde_json::from_value(action.clone()).ok())
    }

    pub fn with_test(mut self, test: TestKind) -> Self {
        self.test = Some(test.key().to_string());
        self
    }

    pub fn with_followed(mut self, test: TestKind) -> Self {
        self.followed = Some(test.key().to_string());
        self
    }

    pub fn with_opposed(mut self, test: TestKind) -> Self {
        self.opposed = Some(test.key().to_string());
        self
    }

    pub fn with_skill(mut self, attribute: impl Into<String>, skill: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self.skill = Some(skill.into());
        self
    }

    /// Fill unset fields from `defaults`. Set fields, including zeroes, are kept.
    pub fn with_defaults(mut self, defaults: &ActionData) -> Self {
        fill(&mut self.test, &defaults.test);
        fill(&mut self.followed, &defaults.followed);
        fill(&mut self.opposed, &defaults.opposed);
        fill(&mut self.attribute, &defaults.attribute);
        fill(&mut self.attribute2, &defaults.attribute2);
        fill(&mut self.skill, &defaults.skill);
        fill(&mut self.limit, &defaults.limit);
        fill(&mut self.threshold, &defaults.threshold);
        fill(&mut self.extended, &defaults.extended);
        if self.dice_pool_mod.is_empty() {
            self.dice_pool_mod = defaults.dice_pool_mod.clone();
        }
        if self.limit_mod.is_empty() {
            self.limit_mod = defaults.limit_mod.clone();
        }
        self
    }

    /// True when nothing would be rolled.
    pub fn is_empty(&self) -> bool {
        self.attribute.is_none() && self.attribute2.is_none() && self.skill.is_none()
    }
}

fn fill<T: Clone>(field: &mut Option<T>, default: &Option<T>) {
    if field.is_none() {
        field.clone_from(default);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageKind {
    Physical,
    #[default]
    Stun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DamageData {
    pub value: i32,
    #[serde(rename = "type")]
    pub kind: DamageKind,
}

impl DamageData {
    pub fn new(value: i32, kind: DamageKind) -> Self {
        Self { value, kind }
    }
}

/// The serializable state of a test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestData {
    #[serde(rename = "type")]
    pub kind: Option<TestKind>,
    pub title: Option<String>,
    pub action: ActionData,

    pub pool: Option<ValueField>,
    pub limit: Option<ValueField>,
    pub threshold: Option<ValueField>,
    /// Set once the test has been rolled; the record is final from then on.
    /// Extended tests keep the last interval here and read `extended_hits`.
    pub hits: Option<ValueField>,
    pub extended_hits: Option<ValueField>,
    /// Set once success or failure has been processed.
    pub outcome: Option<Outcome>,
    pub dice: Vec<u8>,
    pub glitched: Option<bool>,
    pub critical_glitched: Option<bool>,
    pub extended: Option<bool>,

    pub source_actor_handle: Option<DocumentHandle>,
    pub source_item_handle: Option<DocumentHandle>,

    // Opposed tests
    pub against_handle: Option<DocumentHandle>,
    pub against: Option<Box<TestData>>,

    // Summoning
    pub spirit_type_selected: Option<String>,
    pub force: Option<i32>,
    pub drain: Option<i32>,
    pub reagents: Option<i32>,
    pub drain_damage: Option<DamageData>,
    #[serde(alias = "dependentEntityHandle")]
    pub summoned_spirit_handle: Option<DocumentHandle>,
    pub services: Option<i32>,
}

impl TestData {
    pub fn new(action: ActionData) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    pub fn pool_value(&self) -> i32 {
        self.pool.as_ref().map_or(0, |p| p.value)
    }

    pub fn limit_value(&self) -> i32 {
        self.limit.as_ref().map_or(0, |l| l.value)
    }

    pub fn threshold_value(&self) -> i32 {
        self.threshold.as_ref().map_or(0, |t| t.value)
    }

    pub fn hits_value(&self) -> i32 {
        self.hits.as_ref().map_or(0, |h| h.value)
    }

    pub fn extended_hits_value(&self) -> i32 {
        self.extended_hits.as_ref().map_or(0, |h| h.value)
    }

    pub fn is_rolled(&self) -> bool {
        self.hits.is_some()
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Run every data stage of `kind` over `data`.
pub fn prepare_data(kind: TestKind, mut data: TestData) -> TestData {
    data.kind = Some(kind);
    kind.data_stages()
        .iter()
        .fold(data, |data, stage| stage(data))
}

/// Values every test needs.
pub fn base_data(mut data: TestData) -> TestData {
    let title = data
        .kind
        .map_or_else(|| TestKind::default().label(), |kind| kind.label());
    data.title.get_or_insert_with(|| title.to_string());
    data.pool.get_or_insert_with(|| ValueField::new(0));
    data.limit.get_or_insert_with(|| ValueField::new(0));
    let threshold = data.action.threshold.unwrap_or(0);
    data.threshold
        .get_or_insert_with(|| ValueField::new(threshold));
    data.extended_hits.get_or_insert_with(|| ValueField::new(0));
    let extended = data.action.extended.unwrap_or(false);
    data.extended.get_or_insert(extended);
    data
}

/// Values every opposed test needs.
pub fn opposed_data(mut data: TestData) -> TestData {
    if data.against_handle.is_none() {
        data.against_handle = data
            .against
            .as_ref()
            .and_then(|against| against.source_actor_handle.clone());
    }
    data
}

/// Summoning: Magic + Summoning [Force], resisted by the spirit, followed by drain.
pub fn summon_data(mut data: TestData) -> TestData {
    let defaults = ActionData::default()
        .with_skill("magic", "summoning")
        .with_opposed(TestKind::OpposedSummonSpirit)
        .with_followed(TestKind::Drain);
    data.action = data.action.with_defaults(&defaults);
    data.spirit_type_selected
        .get_or_insert_with(|| SPIRIT_TYPES[0].to_string());
    data.force.get_or_insert(1);
    data.drain.get_or_insert(0);
    data.reagents.get_or_insert(0);
    data.drain_damage.get_or_insert_with(DamageData::default);
    data
}

/// The spirit's side of a summoning.
pub fn opposed_summon_data(mut data: TestData) -> TestData {
    data.services.get_or_insert(0);
    data
}

/// Drain resistance: Willpower + the tradition's drain attribute.
pub fn drain_data(mut data: TestData) -> TestData {
    data.action = data.action.with_defaults(&ActionData {
        attribute: Some("willpower".to_string()),
        ..ActionData::default()
    });
    data.drain.get_or_insert(0);
    data.drain_damage.get_or_insert_with(DamageData::default);
    data
}
