//! Shared result cache.
//!
//! The one mutable structure shared between executors. Entries are keyed
//! by query shape plus parameters and expire after an optional TTL.

use relmodel_core::Row;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CacheEntry {
    rows: Arc<Vec<Row>>,
    stored_at: Instant,
}

/// Thread-safe cache of query results.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Option<Duration>,
}

impl ResultCache {
    /// A cache whose entries live for `ttl`, or until invalidated.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Cached rows for `key`, if present and fresh.
    pub fn get(&self, key: &str) -> Option<Arc<Vec<Row>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        if self.is_expired(entry) {
            return None;
        }
        Some(Arc::clone(&entry.rows))
    }

    /// Store rows under `key`, replacing any previous entry.
    pub fn insert(&self, key: impl Into<String>, rows: Vec<Row>) -> Arc<Vec<Row>> {
        let rows = Arc::new(rows);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if self.ttl.is_some() {
            entries.retain(|_, e| !self.is_expired(e));
        }
        entries.insert(
            key.into(),
            CacheEntry {
                rows: Arc::clone(&rows),
                stored_at: Instant::now(),
            },
        );
        rows
    }

    pub fn invalidate(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = entries.len();
        entries.clear();
        tracing::debug!(dropped, "Result cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.ttl.is_some_and(|ttl| entry.stored_at.elapsed() >= ttl)
    }
}
