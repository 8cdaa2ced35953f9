//! Evictable caches.
//!
//! A long-lived worker runs thousands of attempts. Any memo table an engine
//! keeps across attempts (per-generator layouts, type registries, ...) must
//! be registered here so the worker can clear it after every attempt.

use std::fmt;
use std::sync::Arc;

/// A cache the worker clears after every attempt.
pub trait EvictableCache: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Drop every entry and return how many were dropped.
    fn evict(&self) -> usize;
}

/// Totals of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStats {
    pub caches: usize,
    pub entries: usize,
}

/// The set of caches registered by an engine.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Vec<Arc<dyn EvictableCache>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cache: Arc<dyn EvictableCache>) {
        tracing::trace!(cache = cache.name(), "registered evictable cache");
        self.caches.push(cache);
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Evict every registered cache once.
    pub fn evict_all(&self) -> EvictionStats {
        let mut stats = EvictionStats::default();
        for cache in &self.caches {
            let dropped = cache.evict();
            if dropped > 0 {
                tracing::trace!(cache = cache.name(), dropped, "evicted cache");
            }
            stats.caches += 1;
            stats.entries += dropped;
        }
        stats
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.caches.iter().map(|c| c.name()))
            .finish()
    }
}
