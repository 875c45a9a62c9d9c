//! Registry of remote provider metadata.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Metadata;

type Snapshot = Arc<HashMap<String, Arc<Metadata>>>;

/// Remote metadata keyed by entity ID.
///
/// Readers take a cheap snapshot; writers build a new map and swap it in, so
/// a reader never observes a half-applied refresh.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    inner: RwLock<Snapshot>,
}

impl MetadataRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `metadata`.
    #[must_use]
    pub fn from_metadata(metadata: impl IntoIterator<Item = Metadata>) -> Self {
        let registry = Self::new();
        registry.replace_all(metadata);
        registry
    }

    /// Looks up an entity.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<Arc<Metadata>> {
        self.inner.read().get(entity_id).cloned()
    }

    /// Adds or replaces one entity, returning the previous entry.
    pub fn insert(&self, metadata: Metadata) -> Option<Arc<Metadata>> {
        let mut guard = self.inner.write();
        let mut next = HashMap::clone(&guard);
        let entity_id = metadata.entity_id.clone();
        let previous = next.insert(entity_id.clone(), Arc::new(metadata));
        *guard = Arc::new(next);
        tracing::debug!(entity_id = %entity_id, replaced = previous.is_some(), "metadata registered");
        previous
    }

    /// Replaces the whole registry.
    pub fn replace_all(&self, metadata: impl IntoIterator<Item = Metadata>) {
        let next: HashMap<_, _> = metadata
            .into_iter()
            .map(|m| (m.entity_id.clone(), Arc::new(m)))
            .collect();
        let count = next.len();
        *self.inner.write() = Arc::new(next);
        tracing::info!(entities = count, "metadata registry replaced");
    }

    /// Removes one entity.
    pub fn remove(&self, entity_id: &str) -> Option<Arc<Metadata>> {
        let mut guard = self.inner.write();
        if !guard.contains_key(entity_id) {
            return None;
        }
        let mut next = HashMap::clone(&guard);
        let removed = next.remove(entity_id);
        *guard = Arc::new(next);
        removed
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Current contents, unaffected by later writes.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.inner.read())
    }
}
