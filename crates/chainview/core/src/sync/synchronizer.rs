use crate::{
    bus::{ChainEvent, EventBus},
    invalidation::InvalidationCoordinator,
    metrics::Metrics,
    sync::{SyncCommand, SyncState},
    tip::{TipReader, TipWriter},
};
use alloy_primitives::B256;
use chainview_storage::{BlockReader, TransactionReader};
use chainview_types::{AddressId, BlockView, Tip, TouchedAddress, TxId, UpstreamEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consumes upstream events in order and maintains the current tip.
///
/// Every event is fully handled, downstream handlers included, before the next one is read.
/// The tip is published before any [`ChainEvent`] referring to it is emitted; on reorg the
/// retired blocks are invalidated first and the tip is published afterwards, whatever the
/// invalidation outcome.
#[derive(Debug)]
pub struct TipSynchronizer<L> {
    tip: TipWriter,
    state: SyncState,
    invalidation: InvalidationCoordinator,
    ledger: Arc<L>,
    bus: EventBus,
    /// Hash of the last block whose pipeline ran, to skip redelivered events.
    last_block: Option<B256>,
}

impl<L> TipSynchronizer<L>
where
    L: BlockReader + TransactionReader + 'static,
{
    /// Creates a synchronizer owning `tip`.
    pub const fn new(
        tip: TipWriter,
        invalidation: InvalidationCoordinator,
        ledger: Arc<L>,
        bus: EventBus,
    ) -> Self {
        Self { tip, state: SyncState::Synced, invalidation, ledger, bus, last_block: None }
    }

    /// Current state.
    pub const fn state(&self) -> SyncState {
        self.state
    }

    /// A reader of the tip this synchronizer writes.
    pub fn tip_reader(&self) -> TipReader {
        self.tip.reader()
    }

    /// Processes commands until the channel closes or `cancel` fires.
    ///
    /// Cancellation is only observed between commands, so a handled event always completes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SyncCommand>, cancel: CancellationToken) {
        info!(target: "chainview::sync", "Tip synchronizer started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(target: "chainview::sync", "Cancellation requested, stopping tip synchronizer");
                    break;
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        info!(target: "chainview::sync", "Command channel closed, stopping tip synchronizer");
                        break;
                    };
                    self.handle(command).await;
                }
            }
        }
    }

    /// Applies one command and returns the event emitted downstream, if any.
    pub async fn handle(&mut self, command: SyncCommand) -> Option<ChainEvent> {
        let event = match command {
            SyncCommand::Event(UpstreamEvent::Tip(tip)) => self.on_tip(tip),
            SyncCommand::Event(UpstreamEvent::Block(block)) => self.on_block(block).await,
            SyncCommand::Event(UpstreamEvent::Reorg(block)) => Some(self.on_reorg(block.tip())),
            SyncCommand::Event(UpstreamEvent::MempoolTransaction(id)) => {
                Some(self.on_mempool_transaction(id).await)
            }
            SyncCommand::Resync(tip) => self.on_resync(tip).await,
        }?;

        self.bus.publish(&event).await;
        Some(event)
    }

    /// Returns `true` if `tip` should replace the current tip.
    ///
    /// Lower heights and exact duplicates are stale. A different hash at the current height
    /// replaces the tip.
    fn advances(&self, tip: &Tip) -> bool {
        self.tip.current().is_none_or(|current| {
            tip.height > current.height || (tip.height == current.height && tip.hash != current.hash)
        })
    }

    fn publish(&self, tip: Tip) -> Arc<Tip> {
        Metrics::record_tip(tip.height);
        self.tip.publish(tip)
    }

    fn drop_stale(&self, kind: &'static str, tip: &Tip) {
        metrics::counter!(Metrics::STALE_EVENTS_TOTAL, "event" => kind).increment(1);
        debug!(
            target: "chainview::sync",
            event = kind,
            height = tip.height,
            hash = %tip.hash,
            current = self.tip.current().map_or(0, |current| current.height),
            "Dropping stale event"
        );
    }

    fn on_tip(&mut self, tip: Tip) -> Option<ChainEvent> {
        if !self.advances(&tip) {
            self.drop_stale("tip", &tip);
            return None;
        }
        let tip = self.publish(tip);
        debug!(target: "chainview::sync", height = tip.height, hash = %tip.hash, "Tip advanced");
        Some(ChainEvent::TipAdvanced(tip))
    }

    async fn on_block(&mut self, block: BlockView) -> Option<ChainEvent> {
        let tip = block.tip();
        if self.tip.current().is_some_and(|current| tip.height < current.height) {
            self.drop_stale("block", &tip);
            return None;
        }
        if self.last_block == Some(block.hash) {
            self.drop_stale("block", &tip);
            return None;
        }
        if self.advances(&tip) {
            self.publish(tip);
        }

        let touched = match self.ledger.block_address_transactions(block.height).await {
            Ok(touched) => Some(touched),
            Err(err) => {
                warn!(
                    target: "chainview::sync",
                    %err,
                    height = block.height,
                    "Failed to load touched addresses, dropping all balance aggregates"
                );
                None
            }
        };
        let ids = touched.as_deref().map(|touched| address_ids(touched.iter().flatten()));
        self.invalidation.on_block(&block, ids.as_deref());
        self.last_block = Some(block.hash);

        info!(
            target: "chainview::sync",
            height = block.height,
            hash = %block.hash,
            transactions = block.transactions.len(),
            "New block"
        );
        Some(ChainEvent::NewBlock {
            block: Arc::new(block),
            touched: Arc::new(touched.unwrap_or_default()),
        })
    }

    /// Invalidates blocks above `tip` and publishes it.
    fn on_reorg(&mut self, tip: Tip) -> ChainEvent {
        let original_height = self.tip.current().map_or(tip.height, |current| current.height);
        self.state = SyncState::Reorging { original_height };
        info!(
            target: "chainview::sync",
            from = original_height,
            to = tip.height,
            hash = %tip.hash,
            "Reorg detected"
        );

        let report = self.invalidation.on_reorg(&tip, original_height);
        if report.missed > 0 {
            debug!(
                target: "chainview::sync",
                missed = report.missed,
                "Some retired heights were not cached"
            );
        }

        let tip = self.publish(tip);
        self.state = SyncState::Synced;
        self.last_block = None;
        ChainEvent::Reorged { tip, original_height }
    }

    async fn on_mempool_transaction(&mut self, id: TxId) -> ChainEvent {
        let touched = match self.ledger.mempool_transaction_addresses(id).await {
            Ok(touched) => Some(touched),
            Err(err) => {
                warn!(target: "chainview::sync", %err, %id, "Failed to load mempool transaction addresses");
                None
            }
        };
        let ids = touched.as_deref().map(|touched| address_ids(touched.iter()));
        self.invalidation.on_mempool_transaction(ids.as_deref());

        let transaction = match self.ledger.transaction(id).await {
            Ok(transaction) => transaction.map(Arc::new),
            Err(err) => {
                warn!(target: "chainview::sync", %err, %id, "Failed to load mempool transaction");
                None
            }
        };

        ChainEvent::MempoolTransaction {
            id,
            transaction,
            touched: Arc::new(touched.unwrap_or_default()),
        }
    }

    /// Reconciles the tip after a (re)connect, when events may have been missed.
    async fn on_resync(&mut self, tip: Tip) -> Option<ChainEvent> {
        let Some(current) = self.tip.current() else {
            info!(target: "chainview::sync", height = tip.height, "Initial tip");
            return Some(ChainEvent::TipAdvanced(self.publish(tip)));
        };
        if *current == tip {
            debug!(target: "chainview::sync", height = tip.height, "Tip unchanged after resync");
            return None;
        }

        if tip.height > current.height {
            // The chain only extended if our tip is still canonical.
            match self.ledger.block_hash(current.height).await {
                Ok(Some(hash)) if hash != current.hash => {}
                Ok(None) => {}
                Ok(Some(_)) => return Some(ChainEvent::TipAdvanced(self.publish(tip))),
                Err(err) => {
                    warn!(
                        target: "chainview::sync",
                        %err,
                        height = current.height,
                        "Failed to verify tip after resync, assuming extension"
                    );
                    return Some(ChainEvent::TipAdvanced(self.publish(tip)));
                }
            }
        }
        Some(self.on_reorg(tip))
    }
}

fn address_ids<'a>(touched: impl Iterator<Item = &'a TouchedAddress>) -> Vec<AddressId> {
    let mut ids: Vec<AddressId> = touched.map(|address| address.address_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{BalanceCache, BlockCache, TransactionCache},
        test_utils::{MockLedger, block, confirmed_tx, touched},
        tip::tip_channel,
    };
    use chainview_storage::StorageError;
    use chainview_types::{BlockKey, TotalBalanceChanges};
    use std::num::NonZeroUsize;

    struct Harness {
        sync: TipSynchronizer<MockLedger>,
        tip: TipReader,
        blocks: Arc<BlockCache>,
        transactions: Arc<TransactionCache>,
        balances: Arc<BalanceCache>,
    }

    fn harness(ledger: MockLedger) -> Harness {
        let capacity = NonZeroUsize::new(100).unwrap();
        let blocks = Arc::new(BlockCache::new(capacity));
        let transactions = Arc::new(TransactionCache::new(capacity));
        let balances = Arc::new(BalanceCache::new(capacity));
        let invalidation =
            InvalidationCoordinator::new(blocks.clone(), transactions.clone(), balances.clone());
        let (writer, tip) = tip_channel();
        let sync = TipSynchronizer::new(writer, invalidation, Arc::new(ledger), EventBus::new());
        Harness { sync, tip, blocks, transactions, balances }
    }

    fn tip_event(height: u32, fork: u8) -> SyncCommand {
        UpstreamEvent::Tip(block(height, fork).tip()).into()
    }

    #[tokio::test]
    async fn test_tip_height_is_max_seen() {
        let mut h = harness(MockLedger::new());
        for height in [3, 5, 4, 5, 9, 2] {
            h.sync.handle(tip_event(height, 0)).await;
        }
        assert_eq!(h.tip.height(), 9);
    }

    #[tokio::test]
    async fn test_duplicate_tip_is_dropped() {
        let mut h = harness(MockLedger::new());
        assert!(h.sync.handle(tip_event(5, 0)).await.is_some());
        assert!(h.sync.handle(tip_event(5, 0)).await.is_none());
        assert!(h.sync.handle(tip_event(4, 0)).await.is_none());
        // Same height on another branch replaces the tip.
        assert!(h.sync.handle(tip_event(5, 1)).await.is_some());
        assert_eq!(h.tip.current().unwrap().hash, block(5, 1).hash);
    }

    #[tokio::test]
    async fn test_block_runs_pipeline() {
        let mut ledger = MockLedger::new();
        ledger
            .expect_block_address_transactions()
            .times(1)
            .returning(|_| Ok(vec![vec![touched(1)], vec![touched(2), touched(1)]]));
        let mut h = harness(ledger);

        h.blocks.insert(block(9, 0));
        let tx = confirmed_tx(4, 10);
        h.transactions.insert(tx.clone());
        let epoch = h.balances.epoch();
        h.balances.insert_totals(1, epoch, TotalBalanceChanges::default());
        h.balances.insert_totals(3, epoch, TotalBalanceChanges::default());

        let mut next = block(10, 0);
        next.transactions.push(tx.id);
        let event = h.sync.handle(UpstreamEvent::Block(next.clone()).into()).await.unwrap();

        let ChainEvent::NewBlock { block: emitted, touched } = event else {
            panic!("expected a new block event");
        };
        assert_eq!(emitted.hash, next.hash);
        assert_eq!(touched.len(), 2);
        assert_eq!(h.tip.height(), 10);
        assert_eq!(h.blocks.peek(BlockKey::Height(9)).unwrap().next_hash, Some(next.hash));
        assert!(h.transactions.is_empty());
        assert!(h.balances.totals(1).is_none());
        assert!(h.balances.totals(3).is_some());
    }

    #[tokio::test]
    async fn test_block_after_matching_tip_still_runs_pipeline() {
        let mut ledger = MockLedger::new();
        ledger.expect_block_address_transactions().times(1).returning(|_| Ok(Vec::new()));
        let mut h = harness(ledger);

        h.sync.handle(tip_event(10, 0)).await;
        let event = h.sync.handle(UpstreamEvent::Block(block(10, 0)).into()).await;
        assert!(matches!(event, Some(ChainEvent::NewBlock { .. })));

        // Redelivery is ignored.
        assert!(h.sync.handle(UpstreamEvent::Block(block(10, 0)).into()).await.is_none());
    }

    #[tokio::test]
    async fn test_block_below_tip_is_dropped() {
        let mut ledger = MockLedger::new();
        ledger.expect_block_address_transactions().never();
        let mut h = harness(ledger);

        h.sync.handle(tip_event(10, 0)).await;
        assert!(h.sync.handle(UpstreamEvent::Block(block(8, 0)).into()).await.is_none());
        assert_eq!(h.tip.height(), 10);
    }

    #[tokio::test]
    async fn test_block_address_failure_clears_balances() {
        let mut ledger = MockLedger::new();
        ledger
            .expect_block_address_transactions()
            .returning(|_| Err(StorageError::Unavailable("timeout".into())));
        let mut h = harness(ledger);
        h.balances.insert_totals(7, h.balances.epoch(), TotalBalanceChanges::default());

        let event = h.sync.handle(UpstreamEvent::Block(block(1, 0)).into()).await;
        assert!(matches!(event, Some(ChainEvent::NewBlock { touched, .. }) if touched.is_empty()));
        assert!(h.balances.is_empty());
    }

    #[tokio::test]
    async fn test_reorg_invalidates_then_publishes_lower_tip() {
        let mut h = harness(MockLedger::new());
        h.sync.handle(tip_event(100, 0)).await;
        let retired: Vec<_> = (98..=100).map(|height| block(height, 0)).collect();
        for view in &retired {
            h.blocks.insert(view.clone());
        }

        let event = h.sync.handle(UpstreamEvent::Reorg(block(97, 0)).into()).await.unwrap();
        assert!(matches!(event, ChainEvent::Reorged { original_height: 100, .. }));
        assert_eq!(h.tip.height(), 97);
        assert_eq!(h.sync.state(), SyncState::Synced);
        for view in &retired {
            assert!(h.blocks.peek(BlockKey::Height(view.height)).is_none());
            assert!(h.blocks.peek(BlockKey::Hash(view.hash)).is_none());
        }

        // A tip at the pre-reorg height is accepted again afterwards.
        assert!(h.sync.handle(tip_event(98, 1)).await.is_some());
    }

    #[tokio::test]
    async fn test_mempool_transaction_invalidates_unconfirmed() {
        let mut ledger = MockLedger::new();
        ledger.expect_mempool_transaction_addresses().returning(|_| Ok(vec![touched(1)]));
        ledger.expect_transaction().returning(|_| Ok(None));
        let mut h = harness(ledger);
        h.sync.handle(tip_event(10, 0)).await;

        let epoch = h.balances.epoch();
        h.balances.insert_totals(1, epoch, TotalBalanceChanges::default());
        h.balances.insert_unconfirmed(1, epoch, 3);

        let id = B256::repeat_byte(0xaa);
        let event = h.sync.handle(UpstreamEvent::MempoolTransaction(id).into()).await.unwrap();
        assert!(matches!(event, ChainEvent::MempoolTransaction { id: seen, .. } if seen == id));
        assert_eq!(h.tip.height(), 10);
        assert!(h.balances.unconfirmed(1).is_none());
        assert!(h.balances.totals(1).is_some());
    }

    #[tokio::test]
    async fn test_resync_extension_and_reorg() {
        let mut ledger = MockLedger::new();
        let mut calls = 0;
        ledger.expect_block_hash().returning(move |height| {
            calls += 1;
            // First check: still canonical. Second check: replaced by another branch.
            Ok(Some(block(height, if calls == 1 { 0 } else { 1 }).hash))
        });
        let mut h = harness(ledger);

        let initial = h.sync.handle(SyncCommand::Resync(block(10, 0).tip())).await;
        assert!(matches!(initial, Some(ChainEvent::TipAdvanced(_))));
        assert!(h.sync.handle(SyncCommand::Resync(block(10, 0).tip())).await.is_none());

        let extended = h.sync.handle(SyncCommand::Resync(block(12, 0).tip())).await;
        assert!(matches!(extended, Some(ChainEvent::TipAdvanced(_))));

        let reorged = h.sync.handle(SyncCommand::Resync(block(14, 1).tip())).await;
        assert!(matches!(reorged, Some(ChainEvent::Reorged { original_height: 12, .. })));
        assert_eq!(h.tip.height(), 14);

        let lower = h.sync.handle(SyncCommand::Resync(block(13, 1).tip())).await;
        assert!(matches!(lower, Some(ChainEvent::Reorged { original_height: 14, .. })));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let h = harness(MockLedger::new());
        let tip = h.tip.clone();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(h.sync.run(rx, cancel.clone()));

        tx.send(tip_event(3, 0)).await.unwrap();
        let mut watcher = tip.clone();
        assert_eq!(watcher.changed().await.unwrap().height, 3);

        cancel.cancel();
        handle.await.unwrap();
    }
}
