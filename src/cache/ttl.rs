//! Concurrent map whose entries expire after a per-entry TTL

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

/// Writes between two sweeps of expired entries
const PURGE_EVERY: usize = 64;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_live(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

/// TTL cache keyed by string
///
/// Reads after an entry's TTL are misses and drop the entry. Writes are
/// last-writer-wins, and every `PURGE_EVERY`th write sweeps out expired
/// entries whose keys are never read again.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    writes: AtomicUsize,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.is_live() => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        // Guard released above; another writer may have refreshed the entry.
        self.entries.remove_if(key, |_, entry| !entry.is_live());
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                trace!("purged {} expired cache entries", purged);
            }
        }
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Returns whether an entry was present
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live());
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
