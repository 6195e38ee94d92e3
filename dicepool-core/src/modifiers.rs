//! Labeled modifiers and modifiable values.
//!
//! Pools, limits and thresholds are all a base number plus a list of
//! labeled adjustments. Labels are how the user sees where a number came
//! from, so order is kept for display while the sum ignores it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single labeled adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub label: String,
    pub value: i32,
}

impl Modifier {
    pub fn new(label: impl Into<String>, value: i32) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:+}", self.label, self.value)
    }
}

/// Ordered list of modifiers.
///
/// `add_unique` keeps at most one entry per label. `add` appends blindly and
/// is only meant for callers that explicitly want stacking entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierList(Vec<Modifier>);

impl ModifierList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Extend an existing list of modifiers. Nothing already present is dropped.
    pub fn from_parts(parts: impl IntoIterator<Item = Modifier>) -> Self {
        Self(parts.into_iter().collect())
    }

    /// Append a modifier unconditionally.
    pub fn add(&mut self, label: impl Into<String>, value: i32) -> &mut Self {
        self.0.push(Modifier::new(label, value));
        self
    }

    /// Replace the modifier sharing `label`, or append a new one.
    pub fn add_unique(&mut self, label: impl Into<String>, value: i32) -> &mut Self {
        let label = label.into();
        match self.0.iter_mut().find(|m| m.label == label) {
            Some(existing) => existing.value = value,
            None => self.0.push(Modifier { label, value }),
        }
        self
    }

    /// Remove the first modifier with `label`. Absent labels are ignored.
    pub fn remove(&mut self, label: &str) -> &mut Self {
        if let Some(index) = self.0.iter().position(|m| m.label == label) {
            self.0.remove(index);
        }
        self
    }

    pub fn sum(&self) -> i32 {
        self.0.iter().map(|m| m.value).sum()
    }

    pub fn get(&self, label: &str) -> Option<i32> {
        self.0.iter().find(|m| m.label == label).map(|m| m.value)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|m| m.label == label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Modifier> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Modifier] {
        &self.0
    }

    /// User-facing breakdown in insertion order, e.g. `Force +5, Wounds -1`.
    pub fn breakdown(&self) -> String {
        self.0
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<Vec<Modifier>> for ModifierList {
    fn from(parts: Vec<Modifier>) -> Self {
        Self(parts)
    }
}

impl FromIterator<Modifier> for ModifierList {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ModifierList {
    type Item = &'a Modifier;
    type IntoIter = std::slice::Iter<'a, Modifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A base number plus modifiers, with the last calculated effective value.
///
/// `value` is a cache for display and serialization; call [`ValueField::calculate`]
/// after touching `base` or `mod`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueField {
    pub base: i32,
    #[serde(rename = "mod")]
    pub modifiers: ModifierList,
    pub value: i32,
}

impl ValueField {
    pub fn new(base: i32) -> Self {
        Self {
            base,
            modifiers: ModifierList::new(),
            value: base,
        }
    }

    /// Base plus all modifiers, without touching the cached value.
    pub fn effective(&self) -> i32 {
        self.base + self.modifiers.sum()
    }

    /// Recalculate and store the effective value.
    pub fn calculate(&mut self) -> i32 {
        self.value = self.effective();
        self.value
    }
}

impl fmt::Display for ValueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            write!(f, "{}", self.value)
        } else {
            write!(
                f,
                "{} ({} base, {})",
                self.value,
                self.base,
                self.modifiers.breakdown()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_unique_replaces() {
        let mut list = ModifierList::new();
        list.add_unique("Force", 3);
        list.add_unique("Force", 5);
        assert_eq!(list.len(), 1);
        assert_eq!(list.sum(), 5);
    }

    #[test]
    fn test_add_appends() {
        let mut list = ModifierList::new();
        list.add("Cover", 2).add("Cover", 2);
        assert_eq!(list.len(), 2);
        assert_eq!(list.sum(), 4);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut list = ModifierList::from_parts([Modifier::new("Wounds", -1)]);
        let before = list.clone();
        list.remove("Force");
        assert_eq!(list, before);

        list.remove("Wounds");
        assert!(list.is_empty());
    }

    #[test]
    fn test_from_parts_keeps_existing() {
        let mut list = ModifierList::from_parts(vec![
            Modifier::new("Wounds", -2),
            Modifier::new("Smartlink", 2),
        ]);
        list.add_unique("Force", 4);
        assert_eq!(list.len(), 3);
        assert_eq!(list.sum(), 4);
    }

    #[test]
    fn test_breakdown_keeps_insertion_order() {
        let mut list = ModifierList::new();
        list.add_unique("Force", 5).add_unique("Wounds", -1);
        list.add_unique("Force", 6);
        assert_eq!(list.breakdown(), "Force +6, Wounds -1");
    }

    #[test]
    fn test_value_field_replaced_modifier() {
        let mut pool = ValueField::new(6);
        pool.modifiers.add_unique("Force", 3);
        pool.modifiers.add_unique("Force", 5);
        assert_eq!(pool.calculate(), 11);
    }

    #[test]
    fn test_value_field_serializes_mod_key() {
        let mut limit = ValueField::new(2);
        limit.modifiers.add_unique("Force", 4);
        limit.calculate();

        let json = serde_json::to_value(&limit).unwrap();
        assert_eq!(json["mod"][0]["label"], "Force");
        assert_eq!(json["value"], 6);

        let partial: ValueField = serde_json::from_str(r#"{"base": 3}"#).unwrap();
        assert_eq!(partial.base, 3);
        assert!(partial.modifiers.is_empty());
    }
}
