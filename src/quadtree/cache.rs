//! FIFO cache of retired chunk payloads
//!
//! Holds payloads of chunks that were detached from the tree by a split or
//! merge, so that a chunk re-attached shortly after (the viewer turning back)
//! does not need to be rebuilt. When a capacity is set and exceeded, the
//! oldest inserted payload is evicted and handed back to the caller for
//! destruction.

use std::collections::{HashMap, VecDeque};

use super::chunk::ChunkKey;
use super::factory::ChunkFactory;

/// FIFO cache keyed by [`ChunkKey`].
///
/// The cache owns the payloads it holds. A payload is either in the cache or
/// attached to a live node, never both: inserting a key that is already
/// cached means ownership was duplicated somewhere and panics.
pub struct QuadtreeCache<P> {
    /// Map of chunk keys to payloads
    entries: HashMap<ChunkKey, P>,
    /// Insertion order: oldest first, newest last
    insertion_order: VecDeque<ChunkKey>,
    /// Maximum number of payloads to keep (0 = unbounded)
    capacity: usize,
}

impl<P> QuadtreeCache<P> {
    /// Create a new cache
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of payloads to retain, 0 for unbounded
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            insertion_order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a payload
    ///
    /// # Returns
    /// Payloads evicted to make room, oldest first. The caller must destroy them.
    ///
    /// # Panics
    /// If `key` is already cached.
    pub fn put(&mut self, key: ChunkKey, payload: P) -> Vec<(ChunkKey, P)> {
        assert!(
            !self.entries.contains_key(&key),
            "cache consistency violation: payload for {:?} is already cached",
            key
        );

        self.entries.insert(key, payload);
        self.insertion_order.push_back(key);

        let mut evicted = Vec::new();
        if self.capacity > 0 {
            while self.entries.len() > self.capacity {
                match self.evict_oldest() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
        }
        evicted
    }

    /// Remove and return the payload for `key`, if cached
    pub fn take_if_present(&mut self, key: ChunkKey) -> Option<P> {
        let payload = self.entries.remove(&key)?;
        if let Some(pos) = self.insertion_order.iter().position(|&k| k == key) {
            self.insertion_order.remove(pos);
        }
        Some(payload)
    }

    /// Remove the oldest inserted entry
    pub fn evict_oldest(&mut self) -> Option<(ChunkKey, P)> {
        while let Some(key) = self.insertion_order.pop_front() {
            if let Some(payload) = self.entries.remove(&key) {
                log::trace!("Evicting cached chunk {:?}", key);
                return Some((key, payload));
            }
        }
        None
    }

    /// Destroy every cached payload through the factory
    ///
    /// # Returns
    /// Number of payloads destroyed
    pub fn evict_all<F>(&mut self, factory: &F) -> usize
    where
        F: ChunkFactory<Payload = P>,
    {
        let mut count = 0;
        while let Some((_, payload)) = self.evict_oldest() {
            factory.destroy(payload);
            count += 1;
        }
        count
    }

    pub fn contains(&self, key: ChunkKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterator over cached keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &ChunkKey> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadtree::testing::CountingFactory;
    use glam::IVec2;

    fn key(x: i32) -> ChunkKey {
        ChunkKey::new(1, IVec2::new(x, 0))
    }

    #[test]
    fn test_cache_new() {
        let cache: QuadtreeCache<u32> = QuadtreeCache::new(10);
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 10);
    }

    #[test]
    fn test_cache_put_and_take() {
        let mut cache = QuadtreeCache::new(10);
        assert!(cache.put(key(1), "a").is_empty());
        assert!(cache.contains(key(1)));

        assert_eq!(cache.take_if_present(key(1)), Some("a"));
        assert!(!cache.contains(key(1)));
        assert_eq!(cache.take_if_present(key(1)), None);
    }

    #[test]
    fn test_cache_exact_key_match_only() {
        let mut cache = QuadtreeCache::new(0);
        cache.put(ChunkKey::new(2, IVec2::new(1, 1)), 7);

        assert_eq!(cache.take_if_present(ChunkKey::new(1, IVec2::new(1, 1))), None);
        assert_eq!(cache.take_if_present(ChunkKey::new(2, IVec2::new(1, 2))), None);
        assert_eq!(cache.take_if_present(ChunkKey::new(2, IVec2::new(1, 1))), Some(7));
    }

    #[test]
    fn test_cache_fifo_eviction() {
        let mut cache = QuadtreeCache::new(3);
        cache.put(key(1), 1);
        cache.put(key(2), 2);
        cache.put(key(3), 3);

        let evicted = cache.put(key(4), 4);
        assert_eq!(evicted, vec![(key(1), 1)]);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(key(1)));
        assert!(cache.contains(key(4)));
    }

    #[test]
    fn test_cache_take_does_not_refresh_order() {
        let mut cache = QuadtreeCache::new(2);
        cache.put(key(1), 1);
        cache.put(key(2), 2);

        // Re-inserting after a take counts as a new insertion
        let one = cache.take_if_present(key(1)).unwrap();
        cache.put(key(1), one);

        let evicted = cache.put(key(3), 3);
        assert_eq!(evicted, vec![(key(2), 2)]);
        assert!(cache.contains(key(1)));
    }

    #[test]
    fn test_cache_unbounded() {
        let mut cache = QuadtreeCache::new(0);
        for x in 0..1000 {
            assert!(cache.put(key(x), x).is_empty());
        }
        assert_eq!(cache.len(), 1000);
    }

    #[test]
    #[should_panic(expected = "cache consistency violation")]
    fn test_cache_duplicate_put_panics() {
        let mut cache = QuadtreeCache::new(0);
        cache.put(key(1), 1);
        cache.put(key(1), 2);
    }

    #[test]
    fn test_cache_evict_all_destroys_through_factory() {
        let factory = CountingFactory::new();
        let mut cache = QuadtreeCache::new(0);
        for x in 0..5 {
            let config = crate::quadtree::ChunkConfig::new(1, glam::Vec2::ZERO, IVec2::new(x, 0), 1.0);
            cache.put(config.key(), factory.build_ok(&config));
        }

        assert_eq!(cache.evict_all(&factory), 5);
        assert!(cache.is_empty());
        assert_eq!(factory.destroyed(), 5);
    }

    #[test]
    fn test_cache_empty_evict() {
        let mut cache: QuadtreeCache<u8> = QuadtreeCache::new(4);
        assert!(cache.evict_oldest().is_none());
    }
}
