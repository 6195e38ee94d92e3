//! Documents (actors and items) as seen by the engine.
//!
//! The host owns documents; the engine only reads their system data and asks
//! the store to create, patch or delete them. System data is kept as JSON so
//! dotted field paths like `attributes.magic.value` can be looked up at
//! runtime.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Handles
// ============================================================================

/// Top-level document collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Actor,
    Item,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Actor => "Actor",
            DocumentKind::Item => "Item",
        }
    }
}

/// Globally unique, resolvable reference to a document, e.g. `Actor.3f2c...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentHandle(String);

impl DocumentHandle {
    pub fn new(kind: DocumentKind) -> Self {
        Self(format!("{}.{}", kind.prefix(), Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collection encoded in the handle, if it has a known prefix.
    pub fn kind(&self) -> Option<DocumentKind> {
        match self.0.split('.').next() {
            Some("Actor") => Some(DocumentKind::Actor),
            Some("Item") => Some(DocumentKind::Item),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Users
// ============================================================================

/// Identifier of a user connected to the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permission level a user holds on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ownership {
    #[default]
    None,
    Limited,
    Observer,
    Owner,
}

/// A user as exposed by the host's user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// The user's primary character, if assigned.
    pub character: Option<DocumentHandle>,
    /// Game masters keep their default access and are never granted ownership.
    pub is_gm: bool,
}

impl User {
    pub fn player(id: impl Into<String>, character: Option<DocumentHandle>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: UserId(id),
            character,
            is_gm: false,
        }
    }

    pub fn game_master(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: UserId(id),
            character: None,
            is_gm: true,
        }
    }

    pub fn with_character(mut self, character: DocumentHandle) -> Self {
        self.character = Some(character);
        self
    }
}

// ============================================================================
// Documents
// ============================================================================

/// An actor or item with its system data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub handle: DocumentHandle,
    pub name: String,
    /// Ruleset type, e.g. `character`, `spirit`, `vehicle`, `action`.
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(default)]
    pub system: Value,
    #[serde(default)]
    pub ownership: BTreeMap<UserId, Ownership>,
}

impl Document {
    /// Create a document from a seed with a fresh handle.
    pub fn from_seed(seed: DocumentSeed) -> Self {
        Self {
            handle: DocumentHandle::new(seed.kind),
            name: seed.name,
            doc_type: seed.doc_type,
            system: seed.system,
            ownership: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> Option<DocumentKind> {
        self.handle.kind()
    }

    pub fn is_type(&self, doc_type: &str) -> bool {
        self.doc_type == doc_type
    }

    /// Look up a dotted path relative to the document itself
    /// (`name`, `type`, `system.attributes.body.value`, ...).
    pub fn property(&self, path: &str) -> Option<Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match (head, rest) {
            ("system", Some(rest)) => get_path(&self.system, rest).cloned(),
            ("system", None) => Some(self.system.clone()),
            ("name", None) => Some(Value::String(self.name.clone())),
            ("type", None) => Some(Value::String(self.doc_type.clone())),
            ("handle", None) => Some(Value::String(self.handle.to_string())),
            ("ownership", _) => {
                let ownership = serde_json::to_value(&self.ownership).ok()?;
                match rest {
                    Some(rest) => get_path(&ownership, rest).cloned(),
                    None => Some(ownership),
                }
            }
            _ => None,
        }
    }

    /// Look up a dotted path inside system data.
    pub fn system_value(&self, path: &str) -> Option<&Value> {
        get_path(&self.system, path)
    }

    pub fn system_i32(&self, path: &str) -> Option<i32> {
        self.system_value(path).and_then(as_i32)
    }

    pub fn system_str(&self, path: &str) -> Option<&str> {
        self.system_value(path).and_then(Value::as_str)
    }

    /// Handle of the summoner that conjured this document, if any.
    pub fn summoner_handle(&self) -> Option<DocumentHandle> {
        self.system_str("summoner").map(DocumentHandle::from)
    }

    /// Apply an update patch of the shape `{name?, system?, ownership?}`.
    ///
    /// System data is deep-merged; ownership entries are merged per user.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<(), serde_json::Error> {
        if let Some(name) = patch.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
        if let Some(system) = patch.get("system") {
            merge(&mut self.system, system);
        }
        if let Some(ownership) = patch.get("ownership") {
            let levels: BTreeMap<UserId, Ownership> = serde_json::from_value(ownership.clone())?;
            self.ownership.extend(levels);
        }
        Ok(())
    }

    pub fn ownership_of(&self, user: &UserId) -> Ownership {
        self.ownership.get(user).copied().unwrap_or_default()
    }
}

/// Data needed to create a new document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSeed {
    pub kind: DocumentKind,
    pub name: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub system: Value,
}

impl DocumentSeed {
    pub fn actor(name: impl Into<String>, doc_type: impl Into<String>, system: Value) -> Self {
        Self {
            kind: DocumentKind::Actor,
            name: name.into(),
            doc_type: doc_type.into(),
            system,
        }
    }

    pub fn item(name: impl Into<String>, doc_type: impl Into<String>, system: Value) -> Self {
        Self {
            kind: DocumentKind::Item,
            name: name.into(),
            doc_type: doc_type.into(),
            system,
        }
    }
}

// ============================================================================
// JSON path helpers
// ============================================================================

fn pointer(path: &str) -> String {
    let mut pointer = String::with_capacity(path.len() + 1);
    for segment in path.split('.') {
        pointer.push('/');
        pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
    }
    pointer
}

/// Read a dotted path from a JSON value. An empty path returns the value itself.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    value.pointer(&pointer(path))
}

/// Write a dotted path into a JSON value, creating intermediate objects.
///
/// Non-object intermediates are replaced by objects.
pub fn set_path(target: &mut Value, path: &str, new_value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = target;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), new_value);
    }
}

/// Deep-merge `patch` into `target`. Objects merge key by key, everything else replaces.
pub fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && target.get(key).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = target.get_mut(key) {
                        merge(existing, value);
                    }
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Numbers in system data may be stored as integers or floats.
pub fn as_i32(value: &Value) -> Option<i32> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .and_then(|n| i32::try_from(n).ok())
}
