//! Drain resistance.

use super::data::DamageData;
use super::Test;

/// Drain attribute for traditions that don't name one.
pub const DEFAULT_DRAIN_ATTRIBUTE: &str = "logic";

/// Damage left after resisting `drain` with `hits`.
pub fn resisted_drain(drain: i32, hits: i32) -> i32 {
    (drain - hits).max(0)
}

impl Test {
    /// Willpower plus the tradition's drain attribute (`magic.attribute`).
    pub(super) fn prepare_drain_action(&mut self) {
        if self.data.action.attribute2.is_some() {
            return;
        }
        let attribute = self
            .documents
            .actor
            .as_ref()
            .and_then(|actor| actor.system_str("magic.attribute"))
            .unwrap_or(DEFAULT_DRAIN_ATTRIBUTE)
            .to_string();
        self.data.action.attribute2 = Some(attribute);
    }

    /// Every hit short of the drain value is damage taken.
    pub(super) fn prepare_drain_threshold(&mut self) {
        let drain = self.data.drain.unwrap_or(0);
        if let Some(threshold) = self.data.threshold.as_mut() {
            threshold.base = drain;
        }
    }

    pub(super) fn apply_drain_damage(&mut self) {
        let drain = self.data.drain.unwrap_or(0);
        let kind = self.data.drain_damage.unwrap_or_default().kind;
        let damage = resisted_drain(drain, self.total_hits());
        self.data.drain_damage = Some(DamageData::new(damage, kind));
        tracing::info!(drain, damage, ?kind, "Drain resisted");
    }
}
