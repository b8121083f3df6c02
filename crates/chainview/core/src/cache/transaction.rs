use chainview_types::{TransactionView, TxId};
use lru::LruCache;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashSet},
    num::NonZeroUsize,
    ops::RangeInclusive,
    sync::Arc,
};

#[derive(Debug)]
struct Inner {
    entries: LruCache<TxId, Arc<TransactionView>>,
    /// Cached ids per block height, kept in step with `entries`.
    by_height: BTreeMap<u32, HashSet<TxId>>,
}

impl Inner {
    fn unindex(&mut self, view: &TransactionView) {
        if let Some(ids) = self.by_height.get_mut(&view.block_height) {
            ids.remove(&view.id);
            if ids.is_empty() {
                self.by_height.remove(&view.block_height);
            }
        }
    }

    fn pop(&mut self, id: &TxId) -> Option<Arc<TransactionView>> {
        let view = self.entries.pop(id)?;
        self.unindex(&view);
        Some(view)
    }
}

/// Bounded LRU cache of confirmed transaction views, keyed by transaction id.
///
/// Pending transactions are never stored: their view changes as soon as they are mined. A
/// secondary index by block height lets a reorg drop every retired transaction, whether or not
/// its block is still cached.
#[derive(Debug)]
pub struct TransactionCache {
    inner: Mutex<Inner>,
}

impl TransactionCache {
    /// Creates a cache holding at most `capacity` transactions.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner { entries: LruCache::new(capacity), by_height: BTreeMap::new() }),
        }
    }

    /// Looks up a transaction and marks it as recently used.
    pub fn get(&self, id: &TxId) -> Option<Arc<TransactionView>> {
        self.inner.lock().entries.get(id).cloned()
    }

    /// Stores `view` if it is confirmed and returns the shared view either way.
    pub fn insert(&self, view: TransactionView) -> Arc<TransactionView> {
        let view = Arc::new(view);
        if view.is_confirmed() {
            let mut inner = self.inner.lock();
            // Replaced or evicted entries leave the index too.
            if let Some((_, old)) = inner.entries.push(view.id, view.clone()) {
                inner.unindex(&old);
            }
            inner.by_height.entry(view.block_height).or_default().insert(view.id);
        }
        view
    }

    /// Removes a transaction. Returns `true` if it was cached.
    pub fn remove(&self, id: &TxId) -> bool {
        self.inner.lock().pop(id).is_some()
    }

    /// Removes every listed transaction in one critical section and returns how many were cached.
    pub fn remove_all<'a>(&self, ids: impl IntoIterator<Item = &'a TxId>) -> usize {
        let mut inner = self.inner.lock();
        ids.into_iter().filter(|id| inner.pop(id).is_some()).count()
    }

    /// Removes every transaction mined at a height in `heights` and returns how many were cached.
    pub fn remove_heights(&self, heights: RangeInclusive<u32>) -> usize {
        let mut inner = self.inner.lock();
        let retired: Vec<u32> = inner.by_height.range(heights).map(|(height, _)| *height).collect();
        let mut removed = 0;
        for height in retired {
            for id in inner.by_height.remove(&height).unwrap_or_default() {
                removed += usize::from(inner.entries.pop(&id).is_some());
            }
        }
        removed
    }

    /// Number of cached transactions.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if no transaction is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use chainview_types::UNCONFIRMED_HEIGHT;

    fn tx(byte: u8, block_height: u32) -> TransactionView {
        TransactionView {
            id: B256::repeat_byte(byte),
            block_height,
            block_hash: None,
            timestamp: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            receipts: Vec::new(),
            size: 100,
            fees: 0,
        }
    }

    #[test]
    fn test_pending_transactions_are_not_cached() {
        let cache = TransactionCache::new(NonZeroUsize::new(4).unwrap());
        let pending = cache.insert(tx(1, UNCONFIRMED_HEIGHT));
        assert!(cache.get(&pending.id).is_none());

        let mined = cache.insert(tx(2, 50));
        assert_eq!(cache.get(&mined.id).unwrap().block_height, 50);
    }

    #[test]
    fn test_remove_all_counts_cached_entries() {
        let cache = TransactionCache::new(NonZeroUsize::new(4).unwrap());
        cache.insert(tx(1, 10));
        cache.insert(tx(2, 10));

        let ids = [B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(3)];
        assert_eq!(cache.remove_all(&ids), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = TransactionCache::new(NonZeroUsize::new(2).unwrap());
        for byte in 1..=3 {
            cache.insert(tx(byte, 10));
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.remove(&B256::repeat_byte(1)));
        // The evicted entry left the height index.
        assert_eq!(cache.remove_heights(10..=10), 2);
    }

    #[test]
    fn test_remove_heights_drops_only_the_range() {
        let cache = TransactionCache::new(NonZeroUsize::new(8).unwrap());
        cache.insert(tx(1, 97));
        cache.insert(tx(2, 98));
        cache.insert(tx(3, 99));
        cache.insert(tx(4, 99));

        assert_eq!(cache.remove_heights(98..=100), 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&B256::repeat_byte(1)).is_some());
        assert_eq!(cache.remove_heights(98..=100), 0);
    }

    #[test]
    fn test_reinsert_moves_height_index() {
        let cache = TransactionCache::new(NonZeroUsize::new(8).unwrap());
        cache.insert(tx(1, 99));
        // Mined again on the other branch at a lower height.
        cache.insert(tx(1, 98));

        assert_eq!(cache.remove_heights(99..=99), 0);
        assert_eq!(cache.get(&B256::repeat_byte(1)).unwrap().block_height, 98);
    }
}
