use chainview_types::{AddressId, TotalBalanceChanges};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Per-address aggregates cached between blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BalanceEntry {
    totals: Option<TotalBalanceChanges>,
    unconfirmed: Option<i64>,
}

#[derive(Debug)]
struct BalanceEntries {
    entries: LruCache<AddressId, BalanceEntry>,
    epoch: u64,
}

/// Cache of single-address balance aggregates.
///
/// Confirmed totals are dropped when a block touches the address, unconfirmed sums when a
/// mempool transaction or a block touches it. Every invalidation bumps an epoch; a value
/// computed before an invalidation is rejected on insert, so a slow reader cannot write back a
/// result that predates the event.
#[derive(Debug)]
pub struct BalanceCache {
    inner: Mutex<BalanceEntries>,
}

impl BalanceCache {
    /// Creates a cache holding aggregates of at most `capacity` addresses.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self { inner: Mutex::new(BalanceEntries { entries: LruCache::new(capacity), epoch: 0 }) }
    }

    /// Current invalidation epoch. Capture it before querying the ledger.
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Cached confirmed totals of `address`.
    pub fn totals(&self, address: AddressId) -> Option<TotalBalanceChanges> {
        self.inner.lock().entries.get(&address).and_then(|entry| entry.totals)
    }

    /// Cached unconfirmed sum of `address`.
    pub fn unconfirmed(&self, address: AddressId) -> Option<i64> {
        self.inner.lock().entries.get(&address).and_then(|entry| entry.unconfirmed)
    }

    /// Stores confirmed totals computed at `epoch`. Returns `false` if the value is outdated.
    pub fn insert_totals(&self, address: AddressId, epoch: u64, totals: TotalBalanceChanges) -> bool {
        self.update(address, epoch, |entry| entry.totals = Some(totals))
    }

    /// Stores an unconfirmed sum computed at `epoch`. Returns `false` if the value is outdated.
    pub fn insert_unconfirmed(&self, address: AddressId, epoch: u64, value: i64) -> bool {
        self.update(address, epoch, |entry| entry.unconfirmed = Some(value))
    }

    fn update(&self, address: AddressId, epoch: u64, f: impl FnOnce(&mut BalanceEntry)) -> bool {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return false;
        }
        f(inner.entries.get_or_insert_mut(address, BalanceEntry::default));
        true
    }

    /// Drops every aggregate of the given addresses.
    ///
    /// Used when a block is mined: it changes confirmed totals and confirms mempool rows.
    pub fn invalidate<'a>(&self, addresses: impl IntoIterator<Item = &'a AddressId>) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        for address in addresses {
            inner.entries.pop(address);
        }
    }

    /// Drops the unconfirmed sums of the given addresses.
    pub fn invalidate_unconfirmed<'a>(&self, addresses: impl IntoIterator<Item = &'a AddressId>) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        for address in addresses {
            if let Some(entry) = inner.entries.peek_mut(address) {
                entry.unconfirmed = None;
            }
        }
    }

    /// Drops everything. Used on reorg, where any address may have changed.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.entries.clear();
    }

    /// Number of addresses with a cached aggregate.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> BalanceCache {
        BalanceCache::new(NonZeroUsize::new(8).unwrap())
    }

    const TOTALS: TotalBalanceChanges = TotalBalanceChanges { total_received: 15, total_sent: 3 };

    #[test]
    fn test_block_invalidation_drops_both_parts() {
        let cache = cache();
        let epoch = cache.epoch();
        assert!(cache.insert_totals(1, epoch, TOTALS));
        assert!(cache.insert_unconfirmed(1, epoch, 7));

        cache.invalidate(&[1]);
        assert_eq!(cache.totals(1), None);
        assert_eq!(cache.unconfirmed(1), None);
    }

    #[test]
    fn test_mempool_invalidation_keeps_totals() {
        let cache = cache();
        let epoch = cache.epoch();
        cache.insert_totals(1, epoch, TOTALS);
        cache.insert_unconfirmed(1, epoch, 7);

        cache.invalidate_unconfirmed(&[1]);
        assert_eq!(cache.totals(1), Some(TOTALS));
        assert_eq!(cache.unconfirmed(1), None);
    }

    #[test]
    fn test_outdated_values_are_rejected() {
        let cache = cache();
        let before = cache.epoch();
        cache.invalidate(&[2]);

        assert!(!cache.insert_totals(1, before, TOTALS));
        assert_eq!(cache.totals(1), None);
        assert!(cache.insert_totals(1, cache.epoch(), TOTALS));
    }

    #[test]
    fn test_clear_empties_cache() {
        let cache = cache();
        cache.insert_unconfirmed(3, cache.epoch(), -4);
        cache.clear();
        assert!(cache.is_empty());
    }
}
