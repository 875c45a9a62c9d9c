//! Outstanding request IDs.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Operations between two automatic purges.
const DEFAULT_PURGE_INTERVAL: usize = 64;

/// Store of request IDs this service provider has issued and not yet seen
/// answered.
///
/// `consume` must be atomic: of two concurrent calls for the same ID at most
/// one returns `true`.
pub trait RequestIdStore: Send + Sync + std::fmt::Debug {
    /// Records an issued request ID.
    fn register(&self, id: &str, expires_at: DateTime<Utc>);

    /// Removes `id` and reports whether it was outstanding and unexpired.
    fn consume(&self, id: &str, now: DateTime<Utc>) -> bool;

    /// Drops expired entries, returning how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;
}

/// In-process [`RequestIdStore`].
///
/// Requests that are never answered would otherwise stay forever, so every
/// `purge_interval`-th `register` or `consume` also purges expired entries.
#[derive(Debug)]
pub struct InMemoryRequestIdStore {
    ids: DashMap<String, DateTime<Utc>>,
    operations: AtomicUsize,
    purge_interval: usize,
}

impl Default for InMemoryRequestIdStore {
    fn default() -> Self {
        Self {
            ids: DashMap::new(),
            operations: AtomicUsize::new(0),
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }
}

impl InMemoryRequestIdStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Purges after every `interval` operations instead of the default 64.
    #[must_use]
    pub fn with_purge_interval(mut self, interval: usize) -> Self {
        self.purge_interval = interval.max(1);
        self
    }

    fn maybe_purge(&self, now: DateTime<Utc>) {
        let count = self.operations.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.purge_interval == 0 {
            let purged = self.purge_expired(now);
            if purged > 0 {
                tracing::debug!(purged, remaining = self.ids.len(), "expired request ids purged");
            }
        }
    }

    /// Number of outstanding IDs, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true when no ID is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl RequestIdStore for InMemoryRequestIdStore {
    fn register(&self, id: &str, expires_at: DateTime<Utc>) {
        tracing::trace!(request_id = %id, %expires_at, "request id registered");
        self.ids.insert(id.to_string(), expires_at);
        self.maybe_purge(Utc::now());
    }

    fn consume(&self, id: &str, now: DateTime<Utc>) -> bool {
        let removed = self.ids.remove(id);
        self.maybe_purge(now);
        match removed {
            Some((_, expires_at)) if now < expires_at => true,
            Some(_) => {
                tracing::debug!(request_id = %id, "request id expired");
                false
            }
            None => false,
        }
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.ids.len();
        self.ids.retain(|_, expires_at| now < *expires_at);
        before.saturating_sub(self.ids.len())
    }
}
