use crate::{
    cache::{BlockCache, TransactionCache},
    metrics::Metrics,
    tip::TipReader,
};
use alloy_primitives::B256;
use chainview_storage::{BlockReader, StorageError, TransactionReader};
use chainview_types::{BlockKey, BlockView, Confirmed, TransactionView, TxId};
use derive_more::Constructor;
use std::sync::Arc;
use tracing::{debug, warn};

/// Read-through access to blocks and transactions.
///
/// Lookups consult the derived-state caches first and fall back to the ledger on a miss,
/// populating the cache. Tip-relative fields are attached at read time against the current
/// tip snapshot and never stored.
#[derive(Debug, Constructor)]
pub struct ChainReader<L> {
    ledger: Arc<L>,
    blocks: Arc<BlockCache>,
    transactions: Arc<TransactionCache>,
    tip: TipReader,
}

impl<L> ChainReader<L>
where
    L: BlockReader + TransactionReader,
{
    /// Returns the canonical block identified by `key`, with its confirmations.
    pub async fn block(
        &self,
        key: BlockKey,
    ) -> Result<Option<Confirmed<Arc<BlockView>>>, StorageError> {
        let block = match self.blocks.get(key) {
            Some(cached) => {
                Metrics::record_cache_lookup(Metrics::CACHE_BLOCK, true);
                self.revalidate(cached).await
            }
            None => {
                Metrics::record_cache_lookup(Metrics::CACHE_BLOCK, false);
                None
            }
        };

        let block = match block {
            Some(block) => block,
            None => match self.ledger.block(key).await? {
                Some(view) => self.blocks.insert(view),
                None => return Ok(None),
            },
        };

        let confirmations = self.tip.current().map_or(0, |tip| tip.confirmations(block.height));
        Ok(Some(Confirmed::new(block, confirmations)))
    }

    /// Checks a cached block against the ledger and refreshes its `next_hash`.
    ///
    /// Returns `None` if the entry is no longer canonical; it is evicted in that case. Ledger
    /// errors leave the cached entry in place and serve it as is.
    async fn revalidate(&self, cached: Arc<BlockView>) -> Option<Arc<BlockView>> {
        let headers = match self.ledger.headers(&[cached.height, cached.height + 1]).await {
            Ok(headers) => headers,
            Err(err) => {
                warn!(
                    target: "chainview::cache",
                    %err,
                    height = cached.height,
                    "Failed to revalidate cached block, serving cached entry"
                );
                return Some(cached);
            }
        };

        let canonical = headers.iter().find(|header| header.height == cached.height);
        if canonical.is_none_or(|header| header.hash != cached.hash) {
            debug!(
                target: "chainview::cache",
                height = cached.height,
                hash = %cached.hash,
                "Evicting non-canonical cached block"
            );
            metrics::counter!(Metrics::CACHE_STALE_TOTAL, "cache" => Metrics::CACHE_BLOCK)
                .increment(1);
            self.blocks.remove(BlockKey::Hash(cached.hash));
            return None;
        }

        let next_hash: Option<B256> = headers
            .iter()
            .find(|header| header.height == cached.height + 1)
            .map(|header| header.hash);
        if next_hash != cached.next_hash && self.blocks.patch_next_hash(cached.height, next_hash) {
            return self.blocks.peek(BlockKey::Hash(cached.hash));
        }
        Some(cached)
    }

    /// Checks that a cached transaction's block is still canonical at its height.
    ///
    /// Returns `None` after evicting the view if it is not. Ledger errors serve the cached view.
    async fn revalidate_transaction(
        &self,
        view: Arc<TransactionView>,
    ) -> Option<Arc<TransactionView>> {
        let Some(hash) = view.block_hash else {
            return Some(view);
        };
        match self.ledger.block_hash(view.block_height).await {
            Ok(Some(canonical)) if canonical == hash => Some(view),
            Ok(_) => {
                self.evict_transaction(&view);
                None
            }
            Err(err) => {
                warn!(
                    target: "chainview::cache",
                    %err,
                    id = %view.id,
                    "Failed to revalidate cached transaction, serving cached entry"
                );
                Some(view)
            }
        }
    }

    fn evict_transaction(&self, view: &TransactionView) {
        debug!(
            target: "chainview::cache",
            id = %view.id,
            height = view.block_height,
            "Evicting transaction of a retired block"
        );
        self.transactions.remove(&view.id);
        metrics::counter!(Metrics::CACHE_STALE_TOTAL, "cache" => Metrics::CACHE_TRANSACTION)
            .increment(1);
    }

    /// Returns a transaction by id, with its confirmations.
    pub async fn transaction(
        &self,
        id: TxId,
    ) -> Result<Option<Confirmed<Arc<TransactionView>>>, StorageError> {
        let tip = self.tip.current();
        let tip_height = tip.as_ref().map_or(0, |tip| tip.height);

        let cached = match self.transactions.get(&id) {
            // A view mined above the tip was retired by a reorg.
            Some(view) if view.block_height > tip_height => {
                self.evict_transaction(&view);
                None
            }
            Some(view) => self.revalidate_transaction(view).await,
            None => None,
        };
        Metrics::record_cache_lookup(Metrics::CACHE_TRANSACTION, cached.is_some());

        let view = match cached {
            Some(view) => view,
            None => match self.ledger.transaction(id).await? {
                Some(view) => self.transactions.insert(view),
                None => return Ok(None),
            },
        };

        let confirmations = tip.map_or(0, |tip| view.confirmations(&tip));
        Ok(Some(Confirmed::new(view, confirmations)))
    }
}
