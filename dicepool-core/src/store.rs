//! Collaborators the engine talks to: the document store and the user directory.
//!
//! Both are owned by the host. [`MemoryStore`] and [`StaticUsers`] are
//! in-process implementations for tests, demos and headless use.

use crate::document::{Document, DocumentHandle, DocumentSeed, User};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock as StdRwLock;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(DocumentHandle),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid patch for {handle}: {source}")]
    InvalidPatch {
        handle: DocumentHandle,
        source: serde_json::Error,
    },
}

/// Asynchronous access to the host's documents.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Create a document and return its handle.
    async fn create(&self, seed: DocumentSeed) -> Result<DocumentHandle, StoreError>;

    /// Resolve a handle. `Ok(None)` means the document does not exist (any more).
    async fn resolve(&self, handle: &DocumentHandle) -> Result<Option<Document>, StoreError>;

    /// Apply an update patch (`{name?, system?, ownership?}`).
    async fn update(&self, handle: &DocumentHandle, patch: Value) -> Result<(), StoreError>;

    async fn delete(&self, handle: &DocumentHandle) -> Result<(), StoreError>;
}

/// Read-only view of the users connected to the host.
pub trait UserDirectory: Send + Sync {
    fn users(&self) -> Vec<User>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// A document store living in memory.
///
/// Counts lookups so callers can verify when the store is (not) consulted and
/// can be switched into an "unavailable" mode to exercise failure paths.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<DocumentHandle, Document>>,
    lookups: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an existing document as-is.
    pub async fn insert(&self, document: Document) -> DocumentHandle {
        let handle = document.handle.clone();
        self.documents
            .write()
            .await
            .insert(handle.clone(), document);
        handle
    }

    /// Number of `resolve` calls made so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Make every following operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub async fn contains(&self, handle: &DocumentHandle) -> bool {
        self.documents.read().await.contains_key(handle)
    }

    /// Read a document without counting it as an engine lookup.
    pub async fn peek(&self, handle: &DocumentHandle) -> Option<Document> {
        self.documents.read().await.get(handle).cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create(&self, seed: DocumentSeed) -> Result<DocumentHandle, StoreError> {
        self.check_available()?;
        let document = Document::from_seed(seed);
        tracing::debug!(handle = %document.handle, name = %document.name, "Creating document");
        Ok(self.insert(document).await)
    }

    async fn resolve(&self, handle: &DocumentHandle) -> Result<Option<Document>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.documents.read().await.get(handle).cloned())
    }

    async fn update(&self, handle: &DocumentHandle, patch: Value) -> Result<(), StoreError> {
        self.check_available()?;
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(handle)
            .ok_or_else(|| StoreError::NotFound(handle.clone()))?;
        document
            .apply_patch(&patch)
            .map_err(|source| StoreError::InvalidPatch {
                handle: handle.clone(),
                source,
            })
    }

    async fn delete(&self, handle: &DocumentHandle) -> Result<(), StoreError> {
        self.check_available()?;
        tracing::debug!(%handle, "Deleting document");
        self.documents
            .write()
            .await
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(handle.clone()))
    }
}

/// A fixed, in-process user directory.
#[derive(Default)]
pub struct StaticUsers {
    users: StdRwLock<Vec<User>>,
}

impl StaticUsers {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: StdRwLock::new(users),
        }
    }

    pub fn add(&self, user: User) {
        let mut users = match self.users.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.push(user);
    }
}

impl UserDirectory for StaticUsers {
    fn users(&self) -> Vec<User> {
        match self.users.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_resolve_delete() {
        let store = MemoryStore::new();
        let handle = store
            .create(DocumentSeed::actor("Spirit", "spirit", json!({"force": 4})))
            .await
            .unwrap();

        let doc = store.resolve(&handle).await.unwrap().unwrap();
        assert_eq!(doc.system_i32("force"), Some(4));

        store.delete(&handle).await.unwrap();
        assert!(store.resolve(&handle).await.unwrap().is_none());
        assert!(matches!(
            store.delete(&handle).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_merges_system() {
        let store = MemoryStore::new();
        let handle = store
            .create(DocumentSeed::actor("Spirit", "spirit", json!({"force": 4})))
            .await
            .unwrap();

        store
            .update(&handle, json!({"system": {"services": 2}}))
            .await
            .unwrap();

        let doc = store.peek(&handle).await.unwrap();
        assert_eq!(doc.system_i32("force"), Some(4));
        assert_eq!(doc.system_i32("services"), Some(2));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let result = store
            .create(DocumentSeed::actor("Spirit", "spirit", json!({})))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lookup_counting() {
        let store = MemoryStore::new();
        let handle = DocumentHandle::from("Actor.missing");
        assert_eq!(store.lookup_count(), 0);
        let _ = store.resolve(&handle).await;
        assert_eq!(store.lookup_count(), 1);
        let _ = store.peek(&handle).await;
        assert_eq!(store.lookup_count(), 1);
    }

    #[test]
    fn test_static_users() {
        let users = StaticUsers::default();
        users.add(User::game_master("gm"));
        users.add(User::player("p1", None));
        assert_eq!(users.users().len(), 2);
    }
}
