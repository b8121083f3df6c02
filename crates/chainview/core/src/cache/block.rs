use alloy_primitives::B256;
use chainview_types::{BlockKey, BlockView};
use lru::LruCache;
use parking_lot::Mutex;
use std::{collections::HashMap, num::NonZeroUsize, ops::RangeInclusive, sync::Arc};

/// Bounded LRU cache of materialized blocks, addressable by height or hash.
///
/// Entries are stored once, keyed by hash, with a secondary height index kept under the same
/// lock. Removing a block removes both aliases in one critical section, so a reader sees
/// either both keys or neither.
#[derive(Debug)]
pub struct BlockCache {
    inner: Mutex<BlockEntries>,
}

#[derive(Debug)]
struct BlockEntries {
    by_hash: LruCache<B256, Arc<BlockView>>,
    heights: HashMap<u32, B256>,
}

impl BlockEntries {
    fn resolve(&self, key: BlockKey) -> Option<B256> {
        match key {
            BlockKey::Height(height) => self.heights.get(&height).copied(),
            BlockKey::Hash(hash) => Some(hash),
        }
    }

    fn remove_hash(&mut self, hash: &B256) -> Option<Arc<BlockView>> {
        let block = self.by_hash.pop(hash)?;
        if self.heights.get(&block.height) == Some(hash) {
            self.heights.remove(&block.height);
        }
        Some(block)
    }
}

impl BlockCache {
    /// Creates a cache holding at most `capacity` logical blocks.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(BlockEntries {
                by_hash: LruCache::new(capacity),
                heights: HashMap::with_capacity(capacity.get()),
            }),
        }
    }

    /// Looks up a block and marks it as recently used.
    pub fn get(&self, key: BlockKey) -> Option<Arc<BlockView>> {
        let mut entries = self.inner.lock();
        let hash = entries.resolve(key)?;
        entries.by_hash.get(&hash).cloned()
    }

    /// Looks up a block without touching its recency.
    pub fn peek(&self, key: BlockKey) -> Option<Arc<BlockView>> {
        let entries = self.inner.lock();
        let hash = entries.resolve(key)?;
        entries.by_hash.peek(&hash).cloned()
    }

    /// Stores `block` under its height and hash.
    ///
    /// A different block cached at the same height is replaced.
    pub fn insert(&self, block: BlockView) -> Arc<BlockView> {
        let block = Arc::new(block);
        let mut entries = self.inner.lock();

        if let Some(previous) = entries.heights.get(&block.height).copied() {
            if previous != block.hash {
                entries.remove_hash(&previous);
            }
        }
        if let Some((evicted_hash, evicted)) = entries.by_hash.push(block.hash, block.clone()) {
            if evicted_hash != block.hash &&
                entries.heights.get(&evicted.height) == Some(&evicted_hash)
            {
                entries.heights.remove(&evicted.height);
            }
        }
        entries.heights.insert(block.height, block.hash);
        block
    }

    /// Removes the block identified by `key` under both of its aliases.
    pub fn remove(&self, key: BlockKey) -> Option<Arc<BlockView>> {
        let mut entries = self.inner.lock();
        let hash = entries.resolve(key)?;
        entries.remove_hash(&hash)
    }

    /// Removes every cached block whose height falls in `heights`.
    ///
    /// Runs in a single critical section. Returns the removed blocks, highest first, and the
    /// number of heights that had no entry.
    pub fn remove_range(&self, heights: RangeInclusive<u32>) -> (Vec<Arc<BlockView>>, u32) {
        if heights.is_empty() {
            return (Vec::new(), 0);
        }
        let span = u64::from(*heights.end()) - u64::from(*heights.start()) + 1;
        let mut entries = self.inner.lock();

        // Walk whichever side is smaller: the retired range or the cached index.
        let targets: Vec<(u32, B256)> = if span <= entries.heights.len() as u64 {
            heights
                .clone()
                .rev()
                .filter_map(|height| entries.heights.get(&height).map(|hash| (height, *hash)))
                .collect()
        } else {
            let mut found: Vec<(u32, B256)> = entries
                .heights
                .iter()
                .filter(|(height, _)| heights.contains(*height))
                .map(|(height, hash)| (*height, *hash))
                .collect();
            found.sort_unstable_by(|a, b| b.0.cmp(&a.0));
            found
        };

        let removed: Vec<Arc<BlockView>> =
            targets.into_iter().filter_map(|(_, hash)| entries.remove_hash(&hash)).collect();
        let missed = (span - removed.len() as u64).min(u64::from(u32::MAX)) as u32;
        (removed, missed)
    }

    /// Sets the `next_hash` of the block cached at `height`.
    ///
    /// Returns `true` if an entry was updated.
    pub fn patch_next_hash(&self, height: u32, next_hash: Option<B256>) -> bool {
        let mut entries = self.inner.lock();
        let Some(hash) = entries.heights.get(&height).copied() else {
            return false;
        };
        let Some(block) = entries.by_hash.peek_mut(&hash) else {
            return false;
        };
        if block.next_hash == next_hash {
            return false;
        }
        Arc::make_mut(block).next_hash = next_hash;
        true
    }

    /// Number of cached logical blocks.
    pub fn len(&self) -> usize {
        self.inner.lock().by_hash.len()
    }

    /// Returns `true` if no block is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u32, fork: u8) -> BlockView {
        let mut hash = [fork; 32];
        hash[28..].copy_from_slice(&height.to_be_bytes());
        BlockView {
            hash: B256::from(hash),
            height,
            prev_hash: B256::ZERO,
            next_hash: None,
            timestamp: u64::from(height) * 16,
            interval: Some(16),
            size: 1,
            weight: 4,
            miner: String::new(),
            reward: 0,
            transactions: Vec::new(),
            proof_of_stake: true,
            difficulty: 1.0,
        }
    }

    fn cache(capacity: usize) -> BlockCache {
        BlockCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn assert_aliases_agree(cache: &BlockCache, block: &BlockView) {
        let by_height = cache.peek(BlockKey::Height(block.height));
        let by_hash = cache.peek(BlockKey::Hash(block.hash));
        assert_eq!(by_height.is_some(), by_hash.is_some());
        if let (Some(a), Some(b)) = (by_height, by_hash) {
            assert!(Arc::ptr_eq(&a, &b));
        }
    }

    #[test]
    fn test_both_aliases_resolve_to_one_entry() {
        let cache = cache(4);
        let stored = cache.insert(block(7, 0));
        let by_height = cache.get(BlockKey::Height(7)).unwrap();
        let by_hash = cache.get(BlockKey::Hash(stored.hash)).unwrap();
        assert!(Arc::ptr_eq(&by_height, &by_hash));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_by_either_alias_drops_both() {
        let cache = cache(4);
        let a = block(1, 0);
        let b = block(2, 0);
        cache.insert(a.clone());
        cache.insert(b.clone());

        cache.remove(BlockKey::Hash(a.hash)).unwrap();
        cache.remove(BlockKey::Height(2)).unwrap();
        assert!(cache.is_empty());
        assert_aliases_agree(&cache, &a);
        assert_aliases_agree(&cache, &b);
    }

    #[test]
    fn test_lru_eviction_cleans_height_index() {
        let cache = cache(2);
        let blocks: Vec<_> = (1..=3).map(|height| block(height, 0)).collect();
        for block in &blocks {
            cache.insert(block.clone());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.peek(BlockKey::Height(1)).is_none());
        for block in &blocks {
            assert_aliases_agree(&cache, block);
        }
    }

    #[test]
    fn test_fork_at_same_height_replaces_entry() {
        let cache = cache(4);
        let old = block(5, 0);
        let new = block(5, 1);
        cache.insert(old.clone());
        cache.insert(new.clone());

        assert!(cache.peek(BlockKey::Hash(old.hash)).is_none());
        assert_eq!(cache.peek(BlockKey::Height(5)).unwrap().hash, new.hash);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_range_reports_evicted_and_missed() {
        let cache = cache(10);
        for height in [98, 100] {
            cache.insert(block(height, 0));
        }
        cache.insert(block(90, 0));

        let (removed, missed) = cache.remove_range(98..=100);
        assert_eq!(removed.iter().map(|b| b.height).collect::<Vec<_>>(), vec![100, 98]);
        assert_eq!(missed, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.peek(BlockKey::Height(90)).is_some());
    }

    #[test]
    fn test_remove_range_wider_than_cache() {
        let cache = cache(10);
        for height in [3, 5, 1_000] {
            cache.insert(block(height, 0));
        }
        let (removed, missed) = cache.remove_range(4..=2_000_000);
        assert_eq!(removed.iter().map(|b| b.height).collect::<Vec<_>>(), vec![1_000, 5]);
        assert_eq!(missed, 2_000_000 - 4 + 1 - 2);
        assert!(cache.peek(BlockKey::Height(3)).is_some());
    }

    #[test]
    fn test_patch_next_hash() {
        let cache = cache(4);
        let stored = cache.insert(block(3, 0));
        let next = B256::repeat_byte(9);

        assert!(cache.patch_next_hash(3, Some(next)));
        assert!(!cache.patch_next_hash(3, Some(next)));
        assert!(!cache.patch_next_hash(4, Some(next)));

        let patched = cache.get(BlockKey::Hash(stored.hash)).unwrap();
        assert_eq!(patched.next_hash, Some(next));
        // Earlier snapshots are never mutated in place.
        assert_eq!(stored.next_hash, None);
    }
}
