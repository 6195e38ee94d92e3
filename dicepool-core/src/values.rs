//! Value sources: deriving one document's values from another.
//!
//! A value source says where a field's value should come from:
//!
//! - `Local("system.attributes.body.value")` reads from the document itself.
//! - `Remote { provider: "summoner", remainder: "attributes.magic" }` follows
//!   the handle stored at `system.summoner` and reads `system.attributes.magic`
//!   on the target. Written as a string this is `@summoner.attributes.magic`.
//! - `Custom(f)` hands full control to a function.
//!
//! Resolution failures are never fatal for [`ValueResolver::resolve`] and
//! [`ValueResolver::apply_all`]: they are logged and treated as "no value",
//! which leaves the target field untouched.

use crate::document::{get_path, set_path, Document, DocumentHandle};
use crate::store::{EntityStore, StoreError};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Marker prefixing the provider segment of a remote source string.
pub const PROVIDER_MARKER: char = '@';

/// Errors while resolving a value source.
#[derive(Debug, Error)]
pub enum ValueSourceError {
    #[error("An empty value source can't be resolved")]
    Empty,

    #[error("Provider segment of '{0}' is malformed")]
    MalformedProvider(String),

    #[error("Provider '{provider}' can't be resolved on {document}")]
    MissingProvider {
        provider: String,
        document: DocumentHandle,
    },

    #[error("Provider '{provider}' is neither a handle nor an object with a handle")]
    InvalidProvider { provider: String },

    #[error("Provider '{provider}' points to a document that doesn't exist: {handle}")]
    MissingDocument {
        provider: String,
        handle: DocumentHandle,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Custom resolver: `(key, document) -> value`.
pub type SourceFn = dyn Fn(&str, &Document) -> Option<Value> + Send + Sync;

/// Where a value comes from.
#[derive(Clone)]
pub enum ValueSource {
    Local(String),
    Remote { provider: String, remainder: String },
    Custom(Arc<SourceFn>),
}

impl ValueSource {
    /// Parse the string form. A first segment containing `@` makes it remote.
    pub fn parse(source: &str) -> Result<Self, ValueSourceError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ValueSourceError::Empty);
        }

        let (first, remainder) = match source.split_once('.') {
            Some((first, rest)) => (first, rest),
            None => (source, ""),
        };

        if !first.contains(PROVIDER_MARKER) {
            return Ok(ValueSource::Local(source.to_string()));
        }

        let provider = first.replace(PROVIDER_MARKER, "");
        if provider.is_empty() {
            return Err(ValueSourceError::MalformedProvider(source.to_string()));
        }

        Ok(ValueSource::Remote {
            provider,
            remainder: remainder.to_string(),
        })
    }

    pub fn local(path: impl Into<String>) -> Self {
        ValueSource::Local(path.into())
    }

    pub fn remote(provider: impl Into<String>, remainder: impl Into<String>) -> Self {
        ValueSource::Remote {
            provider: provider.into(),
            remainder: remainder.into(),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str, &Document) -> Option<Value> + Send + Sync + 'static,
    {
        ValueSource::Custom(Arc::new(f))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ValueSource::Remote { .. })
    }
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Custom(_) => write!(f, "Custom(<fn>)"),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Local(path) => write!(f, "{path}"),
            ValueSource::Remote {
                provider,
                remainder,
            } if remainder.is_empty() => write!(f, "{PROVIDER_MARKER}{provider}"),
            ValueSource::Remote {
                provider,
                remainder,
            } => write!(f, "{PROVIDER_MARKER}{provider}.{remainder}"),
            ValueSource::Custom(_) => write!(f, "<custom>"),
        }
    }
}

impl FromStr for ValueSource {
    type Err = ValueSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueSource::parse(s)
    }
}

/// Declared value sources, applied in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ValueSources(Vec<(String, ValueSource)>);

impl ValueSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a source for `field`, replacing an earlier declaration.
    pub fn with(mut self, field: impl Into<String>, source: ValueSource) -> Self {
        self.insert(field, source);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, source: ValueSource) {
        let field = field.into();
        match self.0.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = source,
            None => self.0.push((field, source)),
        }
    }

    /// Parse `field => "source string"` pairs.
    pub fn parse<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ValueSourceError> {
        let mut sources = Self::new();
        for (field, source) in pairs {
            sources.insert(field, ValueSource::parse(source)?);
        }
        Ok(sources)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueSource)> {
        self.0.iter().map(|(field, source)| (field.as_str(), source))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolves value sources against documents in a store.
pub struct ValueResolver<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> ValueResolver<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    /// Resolve a single source, reporting why nothing could be resolved.
    ///
    /// `Ok(None)` means the path simply holds no value.
    pub async fn try_resolve(
        &self,
        key: &str,
        source: &ValueSource,
        document: &Document,
    ) -> Result<Option<Value>, ValueSourceError> {
        tracing::debug!(
            %source,
            document = %document.name,
            doc_type = %document.doc_type,
            "Resolving value source"
        );

        match source {
            ValueSource::Custom(f) => Ok(f(key, document)),
            ValueSource::Local(path) => Ok(document.property(path)),
            ValueSource::Remote {
                provider,
                remainder,
            } => {
                let provider_value = document.system_value(provider).ok_or_else(|| {
                    ValueSourceError::MissingProvider {
                        provider: provider.clone(),
                        document: document.handle.clone(),
                    }
                })?;
                let handle = provider_handle(provider, provider_value)?;

                let target = self.store.resolve(&handle).await?.ok_or_else(|| {
                    ValueSourceError::MissingDocument {
                        provider: provider.clone(),
                        handle: handle.clone(),
                    }
                })?;

                Ok(get_path(&target.system, remainder)
                    .cloned()
                    .map(|value| with_provenance(value, &target.handle, &source.to_string())))
            }
        }
    }

    /// Resolve a single source; failures are logged and become `None`.
    pub async fn resolve(
        &self,
        key: &str,
        source: &ValueSource,
        document: &Document,
    ) -> Option<Value> {
        match self.try_resolve(key, source, document).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, %key, %source, "Value source could not be resolved");
                None
            }
        }
    }

    /// Write every resolvable source into `target` at its field path.
    ///
    /// Fields without a value are left untouched; `0`, `false` and `null` are
    /// real values and are written.
    pub async fn apply_all(&self, target: &mut Value, sources: &ValueSources, document: &Document) {
        tracing::debug!(
            document = %document.name,
            count = sources.len(),
            "Applying value sources"
        );

        for (field, source) in sources.iter() {
            if let Some(value) = self.resolve(field, source, document).await {
                set_path(target, field, value);
            }
        }
    }
}

/// A provider is either a bare handle or an object carrying one.
fn provider_handle(provider: &str, value: &Value) -> Result<DocumentHandle, ValueSourceError> {
    match value {
        Value::String(handle) if !handle.is_empty() => Ok(DocumentHandle::from(handle.as_str())),
        Value::Object(map) => match map.get("handle") {
            Some(Value::String(handle)) if !handle.is_empty() => {
                Ok(DocumentHandle::from(handle.as_str()))
            }
            _ => Err(ValueSourceError::InvalidProvider {
                provider: provider.to_string(),
            }),
        },
        _ => Err(ValueSourceError::MissingProvider {
            provider: provider.to_string(),
            document: DocumentHandle::from("<unknown>"),
        }),
    }
}

/// Annotate object values with where they came from. Primitives and arrays pass through.
fn with_provenance(value: Value, handle: &DocumentHandle, source: &str) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert(
                "source".to_string(),
                json!({"handle": handle.as_str(), "source": source}),
            );
            Value::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentSeed;
    use crate::store::MemoryStore;

    async fn summoner_and_spirit(store: &MemoryStore) -> (Document, Document) {
        let summoner = Document::from_seed(DocumentSeed::actor(
            "Ada",
            "character",
            json!({
                "attributes": {"magic": {"base": 5, "value": 5}},
                "initiative": 0,
                "tags": ["mage"]
            }),
        ));
        store.insert(summoner.clone()).await;

        let spirit = Document::from_seed(DocumentSeed::actor(
            "Ada Air Spirit",
            "spirit",
            json!({
                "force": 4,
                "summoner": summoner.handle.as_str(),
                "linked": {"handle": summoner.handle.as_str()},
                "broken": {"name": "no handle here"},
            }),
        ));
        (summoner, spirit)
    }

    #[test]
    fn test_parse_variants() {
        assert!(matches!(
            ValueSource::parse("system.force").unwrap(),
            ValueSource::Local(p) if p == "system.force"
        ));
        assert!(matches!(
            ValueSource::parse("@summoner.attributes.magic").unwrap(),
            ValueSource::Remote { provider, remainder }
                if provider == "summoner" && remainder == "attributes.magic"
        ));
        assert!(matches!(ValueSource::parse(""), Err(ValueSourceError::Empty)));
        assert!(matches!(
            ValueSource::parse("@.magic"),
            Err(ValueSourceError::MalformedProvider(_))
        ));
        assert_eq!(
            ValueSource::parse("@summoner.attributes.magic")
                .unwrap()
                .to_string(),
            "@summoner.attributes.magic"
        );
    }

    #[tokio::test]
    async fn test_local_source_never_hits_store() {
        let store = MemoryStore::new();
        let (_, spirit) = summoner_and_spirit(&store).await;
        let resolver = ValueResolver::new(&store);

        let value = resolver
            .resolve("force", &ValueSource::local("system.force"), &spirit)
            .await;
        assert_eq!(value, Some(json!(4)));
        assert_eq!(store.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_object_gets_provenance() {
        let store = MemoryStore::new();
        let (summoner, spirit) = summoner_and_spirit(&store).await;
        let resolver = ValueResolver::new(&store);

        let source = ValueSource::parse("@summoner.attributes.magic").unwrap();
        let value = resolver.resolve("magic", &source, &spirit).await.unwrap();

        assert_eq!(value["value"], 5);
        assert_eq!(value["source"]["handle"], summoner.handle.as_str());
        assert_eq!(value["source"]["source"], "@summoner.attributes.magic");
        assert_eq!(store.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_remote_primitives_and_arrays_pass_through() {
        let store = MemoryStore::new();
        let (_, spirit) = summoner_and_spirit(&store).await;
        let resolver = ValueResolver::new(&store);

        let zero = resolver
            .resolve("init", &ValueSource::remote("linked", "initiative"), &spirit)
            .await;
        assert_eq!(zero, Some(json!(0)));

        let tags = resolver
            .resolve("tags", &ValueSource::remote("summoner", "tags"), &spirit)
            .await;
        assert_eq!(tags, Some(json!(["mage"])));
    }

    #[tokio::test]
    async fn test_unresolvable_provider_is_no_value() {
        let store = MemoryStore::new();
        let (_, spirit) = summoner_and_spirit(&store).await;
        let resolver = ValueResolver::new(&store);

        let missing = ValueSource::remote("owner", "attributes.magic");
        assert!(matches!(
            resolver.try_resolve("magic", &missing, &spirit).await,
            Err(ValueSourceError::MissingProvider { .. })
        ));
        assert_eq!(resolver.resolve("magic", &missing, &spirit).await, None);

        let invalid = ValueSource::remote("broken", "attributes.magic");
        assert!(matches!(
            resolver.try_resolve("magic", &invalid, &spirit).await,
            Err(ValueSourceError::InvalidProvider { .. })
        ));
    }

    #[tokio::test]
    async fn test_deleted_target_is_no_value() {
        let store = MemoryStore::new();
        let (summoner, spirit) = summoner_and_spirit(&store).await;
        store.delete(&summoner.handle).await.unwrap();
        let resolver = ValueResolver::new(&store);

        let source = ValueSource::remote("summoner", "attributes.magic");
        assert!(matches!(
            resolver.try_resolve("magic", &source, &spirit).await,
            Err(ValueSourceError::MissingDocument { .. })
        ));
    }

    #[tokio::test]
    async fn test_custom_source_is_verbatim() {
        let store = MemoryStore::new();
        let (_, spirit) = summoner_and_spirit(&store).await;
        let resolver = ValueResolver::new(&store);

        let source = ValueSource::custom(|key, doc| Some(json!(format!("{key}:{}", doc.name))));
        let value = resolver.resolve("anything", &source, &spirit).await;
        assert_eq!(value, Some(json!("anything:Ada Air Spirit")));
        assert_eq!(store.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_all_skips_only_missing_values() {
        let store = MemoryStore::new();
        let (_, spirit) = summoner_and_spirit(&store).await;
        let resolver = ValueResolver::new(&store);

        let sources = ValueSources::new()
            .with("attributes.magic", ValueSource::remote("summoner", "attributes.magic"))
            .with("initiative", ValueSource::remote("summoner", "initiative"))
            .with("edge", ValueSource::remote("summoner", "attributes.edge"))
            .with("armor", ValueSource::remote("nobody", "armor"));

        let mut target = json!({"edge": 2, "armor": 9, "initiative": 7});
        resolver.apply_all(&mut target, &sources, &spirit).await;

        assert_eq!(target["attributes"]["magic"]["value"], 5);
        // Zero is a real value and overwrites.
        assert_eq!(target["initiative"], 0);
        // Nothing resolved: left untouched.
        assert_eq!(target["edge"], 2);
        assert_eq!(target["armor"], 9);
    }
}
