//! Eviction of derived state in response to chain events.

use crate::{
    cache::{BalanceCache, BlockCache, TransactionCache},
    metrics::Metrics,
};
use chainview_types::{AddressId, BlockKey, BlockView, Tip};
use derive_more::Constructor;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a reorg invalidation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Heights whose cached block was evicted, highest first.
    pub evicted: Vec<u32>,
    /// Retired heights that had no cached block.
    pub missed: u32,
    /// Transactions evicted because their block was retired.
    pub transactions: usize,
}

/// Removes cache entries that chain events made stale.
///
/// All sweeps operate on in-process caches and never fail. Entries a sweep cannot reach, such
/// as transactions on a branch abandoned by a resync whose tip is higher than the old one, are
/// caught on read by the height and hash checks in [`ChainReader`](crate::ChainReader).
#[derive(Debug, Clone, Constructor)]
pub struct InvalidationCoordinator {
    blocks: Arc<BlockCache>,
    transactions: Arc<TransactionCache>,
    balances: Arc<BalanceCache>,
}

impl InvalidationCoordinator {
    /// Evicts every block retired by a reorg from `original_height` down to `tip`.
    ///
    /// Must complete before `tip` is published. Blocks in `(tip.height, original_height]` are
    /// removed under both keys in a single critical section. Every transaction cached at those
    /// heights is dropped whether or not its block was cached. A different block cached at
    /// `tip.height` is replaced along with its transactions. Every balance aggregate is
    /// discarded since any address may have been touched by the retired blocks.
    pub fn on_reorg(&self, tip: &Tip, original_height: u32) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        if original_height > tip.height {
            let retired = tip.height + 1..=original_height;
            let (removed, missed) = self.blocks.remove_range(retired.clone());
            report.missed = missed;
            report.transactions = self.transactions.remove_heights(retired);
            report.evicted = removed.iter().map(|block| block.height).collect();
        }

        // The new tip may sit on the other branch at a height we already cached.
        if let Some(cached) = self.blocks.peek(BlockKey::Height(tip.height)) {
            if cached.hash != tip.hash {
                self.blocks.remove(BlockKey::Hash(cached.hash));
                report.transactions += self.transactions.remove_heights(tip.height..=tip.height);
                report.evicted.push(cached.height);
            } else {
                self.blocks.patch_next_hash(tip.height, None);
            }
        }

        self.balances.clear();

        let depth = original_height.saturating_sub(tip.height);
        Metrics::record_reorg(depth, report.evicted.len(), report.missed);
        info!(
            target: "chainview::invalidation",
            from = original_height,
            to = tip.height,
            evicted = report.evicted.len(),
            missed = report.missed,
            transactions = report.transactions,
            "Invalidated retired blocks"
        );
        report
    }

    /// Applies the cache effects of a newly materialized canonical block.
    ///
    /// Links the parent's `next_hash`, drops transactions that were cached before being mined,
    /// and invalidates balance aggregates of the touched addresses. With `touched` unknown,
    /// every balance aggregate is dropped.
    pub fn on_block(&self, block: &BlockView, touched: Option<&[AddressId]>) {
        if block.height > 0 {
            self.blocks.patch_next_hash(block.height - 1, Some(block.hash));
        }
        let transactions = self.transactions.remove_all(&block.transactions);

        match touched {
            Some(addresses) => self.balances.invalidate(addresses),
            None => self.balances.clear(),
        }
        debug!(
            target: "chainview::invalidation",
            height = block.height,
            transactions,
            "Applied block to caches"
        );
    }

    /// Drops unconfirmed sums of addresses touched by a new mempool transaction.
    ///
    /// With `touched` unknown, every balance aggregate is dropped.
    pub fn on_mempool_transaction(&self, touched: Option<&[AddressId]>) {
        match touched {
            Some(addresses) => self.balances.invalidate_unconfirmed(addresses),
            None => self.balances.clear(),
        }
    }
}
