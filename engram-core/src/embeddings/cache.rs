//! Bounded LRU cache over embedding results.
//!
//! Keyed by a stable hash of the input text so identical content never
//! re-calls the provider. Reads and writes share one short-held lock.

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::service::Embedded;

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheMetrics {
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 { 0.0 } else { hits / total }
    }
}

/// Stable hash of normalized text, shared with the fingerprint lock map.
#[must_use]
pub fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.trim().hash(&mut hasher);
    hasher.finish()
}

/// Shared LRU of embeddings.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<u64, Arc<Embedded>>>,
    metrics: CacheMetrics,
}

impl EmbeddingCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            metrics: CacheMetrics::default(),
        }
    }

    #[must_use]
    pub fn get(&self, text: &str) -> Option<Arc<Embedded>> {
        let key = content_hash(text);
        let found = self.entries.lock().get(&key).cloned();
        if found.is_some() {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn put(&self, text: &str, embedded: Arc<Embedded>) {
        self.entries.lock().put(content_hash(text), embedded);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}
