//! Message deduplication cache

use std::collections::HashSet;
use std::sync::Mutex;

/// Default number of ids remembered before the cache is cleared
pub const DEFAULT_CAPACITY: usize = 1000;

/// Bounded set of message ids already handed to the pipeline
///
/// Shared by the push and poll paths. When the set reaches capacity it is
/// cleared wholesale; an id evicted that way can be processed again, which
/// the checkpoint makes unlikely for the poll path.
#[derive(Debug)]
pub struct DedupCache {
    seen: Mutex<HashSet<String>>,
    capacity: usize,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DedupCache {
    /// Create a cache holding at most `capacity` ids
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`, returning `true` on first sight
    ///
    /// The check and the insert happen under one lock, so of two
    /// concurrent callers with the same id exactly one gets `true`.
    pub fn insert(&self, id: &str) -> bool {
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if seen.contains(id) {
            return false;
        }

        if seen.len() >= self.capacity {
            tracing::debug!(capacity = self.capacity, "dedup cache full, clearing");
            seen.clear();
        }

        seen.insert(id.to_string());
        true
    }

    /// Whether `id` is currently remembered
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(id)
    }

    /// Number of remembered ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
