//! Bounded seen-message set used by the gossip router to decide whether a
//! packet has already been processed (spec §4.4 invariant 1).
//!
//! Watermark of 10,000 entries is not spec-mandated (open question 2); it
//! matches the reference mesh chat corpus's `MAX_MESSAGE_CACHE_SIZE`.

use std::num::NonZeroUsize;

use lru::LruCache;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Tracks message ids we've already delivered-or-relayed so duplicates
/// arriving over a different path are dropped silently.
pub struct SeenSet {
    cache: LruCache<String, ()>,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        Self { cache: LruCache::new(capacity) }
    }

    /// Returns `true` if `id` had not been seen before (and is now recorded).
    /// Returns `false` if it was already present — caller must not relay or
    /// re-deliver it.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.cache.contains(id) {
            self.cache.promote(id);
            return false;
        }
        self.cache.put(id.to_string(), ());
        true
    }

    pub fn contains(&mut self, id: &str) -> bool {
        self.cache.contains(id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_is_new_second_is_duplicate() {
        let mut seen = SeenSet::new(4);
        assert!(seen.insert("m1"));
        assert!(!seen.insert("m1"));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut seen = SeenSet::new(2);
        assert!(seen.insert("m1"));
        assert!(seen.insert("m2"));
        assert!(seen.insert("m3"));
        assert!(seen.insert("m1"), "m1 should have been evicted and count as new again");
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn touching_an_entry_protects_it_from_eviction() {
        let mut seen = SeenSet::new(2);
        seen.insert("m1");
        seen.insert("m2");
        assert!(!seen.insert("m1"));
        assert!(seen.insert("m3"));
        assert!(seen.contains("m1"));
        assert!(!seen.contains("m2"));
    }
}
