//! Creating tests from actions, items and serialized records.

use crate::document::Document;
use crate::resolution::{
    infiltration_action, ActionData, DroneError, Notice, Test, TestContext, TestData,
    TestDocuments, TestError, TestKind, TestOptions,
};
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

lazy_static! {
    /// Test kinds by the key actions and records use for them.
    static ref TEST_CLASSES: HashMap<&'static str, TestKind> =
        TestKind::ALL.iter().map(|kind| (kind.key(), *kind)).collect();
}

/// Look up a test kind by key. Unknown keys yield `None`.
pub fn resolve_test_class(key: &str) -> Option<TestKind> {
    TEST_CLASSES.get(key).copied()
}

/// Builds tests that share one context.
#[derive(Debug, Clone)]
pub struct TestFactory {
    ctx: Arc<TestContext>,
}

impl TestFactory {
    pub fn new(ctx: Arc<TestContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<TestContext> {
        &self.ctx
    }

    /// A test for an action descriptor. Actions without a test key roll a plain success test.
    pub fn from_action(
        &self,
        action: ActionData,
        documents: TestDocuments,
        options: TestOptions,
    ) -> Result<Test, TestError> {
        let kind = kind_for(&action)?;
        Test::new(
            kind,
            TestData::new(action),
            documents,
            options,
            Arc::clone(&self.ctx),
        )
    }

    /// A test for the action stored on `item`, acted by `actor`.
    ///
    /// Drone infiltration derives its action from the acting vehicle; a
    /// non-vehicle actor leaves the test with an empty action and an error notice.
    pub fn from_item(
        &self,
        item: Document,
        actor: Option<Document>,
        options: TestOptions,
    ) -> Result<Test, TestError> {
        let mut action = ActionData::from_item(&item).unwrap_or_default();
        let kind = kind_for(&action)?;
        let mut notice = None;

        if kind == TestKind::DroneInfiltration {
            match infiltration_action(Some(&item), actor.as_ref()) {
                Ok(derived) => action = derived.with_defaults(&action),
                Err(DroneError::MissingDocuments) => {}
                Err(e) => {
                    tracing::error!(error = %e, item = %item.name, "Can't derive drone infiltration action");
                    notice = Some(Notice::error(e.to_string()));
                    action = ActionData::default().with_test(kind);
                }
            }
        }

        let documents = TestDocuments::new(actor, Some(item));
        let mut test = Test::new(
            kind,
            TestData::new(action),
            documents,
            options,
            Arc::clone(&self.ctx),
        )?;
        if let Some(notice) = notice {
            test.notify(notice);
        }
        Ok(test)
    }

    /// Rebuild a test from its record.
    pub fn from_record(&self, data: TestData) -> Result<Test, TestError> {
        Test::from_record(data, Arc::clone(&self.ctx))
    }

    /// Rebuild a test from its JSON record.
    pub fn from_json(&self, record: Value) -> Result<Test, TestError> {
        if let Some(key) = record.get("type").and_then(Value::as_str) {
            if resolve_test_class(key).is_none() {
                return Err(TestError::UnknownKind(key.to_string()));
            }
        }
        let data: TestData = serde_json::from_value(record)?;
        self.from_record(data)
    }

    /// The opposed test for `test`'s action, with `test` as the test it opposes.
    pub fn opposed_from(&self, test: &Test) -> Result<Option<Test>, TestError> {
        let Some(key) = test.data.action.opposed.as_deref() else {
            return Ok(None);
        };
        let kind = resolve_test_class(key).ok_or_else(|| TestError::UnknownKind(key.to_string()))?;

        Test::with_against(
            kind,
            TestData::default(),
            TestDocuments::default(),
            test.options,
            test.clone(),
            Arc::clone(&self.ctx),
        )
        .map(Some)
    }

    /// The test that follows `test`, built but not run.
    pub fn follow_up_for(&self, test: &Test) -> Result<Option<Test>, TestError> {
        test.build_follow_up()
    }
}

fn kind_for(action: &ActionData) -> Result<TestKind, TestError> {
    match action.test.as_deref() {
        Some(key) => resolve_test_class(key).ok_or_else(|| {
            tracing::warn!(%key, "Unknown test requested");
            TestError::UnknownKind(key.to_string())
        }),
        None => Ok(TestKind::Success),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn factory() -> TestFactory {
        TestFactory::new(Arc::new(TestContext::new(Arc::new(MemoryStore::new()))))
    }

    #[test]
    fn test_resolve_test_class() {
        assert_eq!(resolve_test_class("SummonSpiritTest"), Some(TestKind::SummonSpirit));
        assert_eq!(resolve_test_class("DrainTest"), Some(TestKind::Drain));
        assert_eq!(resolve_test_class("FireballTest"), None);
        assert_eq!(resolve_test_class(""), None);
    }

    #[test]
    fn test_from_action() {
        let factory = factory();
        let test = factory
            .from_action(
                ActionData::default().with_test(TestKind::SummonSpirit),
                TestDocuments::default(),
                TestOptions::default(),
            )
            .unwrap();
        assert_eq!(test.kind(), TestKind::SummonSpirit);

        let test = factory
            .from_action(ActionData::default(), TestDocuments::default(), TestOptions::default())
            .unwrap();
        assert_eq!(test.kind(), TestKind::Success);

        let result = factory.from_action(
            ActionData {
                test: Some("FireballTest".to_string()),
                ..ActionData::default()
            },
            TestDocuments::default(),
            TestOptions::default(),
        );
        assert!(matches!(result, Err(TestError::UnknownKind(key)) if key == "FireballTest"));
    }

    #[test]
    fn test_from_json_unknown_type() {
        let result = factory().from_json(json!({"type": "FireballTest"}));
        assert!(matches!(result, Err(TestError::UnknownKind(_))));
    }

    #[test]
    fn test_opposed_from_plain_test_is_none() {
        let factory = factory();
        let test = factory
            .from_action(ActionData::default(), TestDocuments::default(), TestOptions::default())
            .unwrap();
        assert!(factory.opposed_from(&test).unwrap().is_none());
    }
}
