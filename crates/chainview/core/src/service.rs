//! Wiring of the chainview components into one runnable service.

use crate::{
    aggregator::BalanceAggregator,
    broadcast::{BroadcastFanout, RoomHub},
    bus::{EventBus, WorkQueue, WorkReceiver, work_queue},
    cache::{BalanceCache, BlockCache, ChainReader, TransactionCache},
    config::{Config, ConfigError},
    invalidation::InvalidationCoordinator,
    metrics::Metrics,
    refresher::{MetricCache, RefreshJob, RefreshTrigger, StatisticsRefresher, run_schedule},
    sync::TipSynchronizer,
    tip::{TipReader, tip_channel},
    upstream::{UpstreamClient, UpstreamSubscriber},
};
use chainview_storage::{LedgerReader, RichListStore, StatisticsSource};
use std::sync::Arc;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Capacity of the refresh job queue.
const REFRESH_QUEUE_CAPACITY: usize = 64;

/// Errors raised by the [`ChainviewService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A service task panicked.
    #[error("service task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The assembled chainview service.
///
/// Read handles ([`Self::chain_reader`], [`Self::aggregator`], [`Self::hub`],
/// [`Self::metric_cache`], [`Self::tip`]) stay valid while [`Self::run`] drives the background
/// tasks.
#[derive(Debug)]
pub struct ChainviewService<L, C> {
    config: Config,
    client: Arc<C>,
    synchronizer: TipSynchronizer<L>,
    refresher: Arc<StatisticsRefresher<L>>,
    jobs: (WorkQueue<RefreshJob>, WorkReceiver<RefreshJob>),
    blocks: Arc<BlockCache>,
    reader: Arc<ChainReader<L>>,
    aggregator: Arc<BalanceAggregator<L>>,
    hub: Arc<RoomHub>,
    metric_cache: Arc<MetricCache>,
    tip: TipReader,
}

impl<L, C> ChainviewService<L, C>
where
    L: LedgerReader + RichListStore + StatisticsSource + 'static,
    C: UpstreamClient + 'static,
{
    /// Builds every component from `config`.
    pub fn new(config: Config, ledger: Arc<L>, client: Arc<C>) -> Result<Self, ServiceError> {
        config.validate()?;

        let blocks = Arc::new(BlockCache::new(config.block_cache_capacity));
        let transactions = Arc::new(TransactionCache::new(config.transaction_cache_capacity));
        let balances = Arc::new(BalanceCache::new(config.balance_cache_capacity));
        let (tip_writer, tip) = tip_channel();
        let hub = Arc::new(RoomHub::new(config.subscriber_buffer));
        let metric_cache = Arc::new(MetricCache::new());
        let jobs = work_queue(REFRESH_QUEUE_CAPACITY);

        let mut bus = EventBus::new();
        bus.register(Arc::new(BroadcastFanout::new(hub.clone())));
        bus.register(Arc::new(RefreshTrigger::new(jobs.0.clone())));

        let invalidation =
            InvalidationCoordinator::new(blocks.clone(), transactions.clone(), balances.clone());
        let synchronizer = TipSynchronizer::new(tip_writer, invalidation, ledger.clone(), bus);
        let refresher = Arc::new(StatisticsRefresher::new(
            ledger.clone(),
            metric_cache.clone(),
            tip.clone(),
            hub.clone(),
        ));
        let reader =
            Arc::new(ChainReader::new(ledger.clone(), blocks.clone(), transactions, tip.clone()));
        let aggregator =
            Arc::new(BalanceAggregator::new(ledger, balances, tip.clone(), config.maturity_window));

        Ok(Self {
            config,
            client,
            synchronizer,
            refresher,
            jobs,
            blocks,
            reader,
            aggregator,
            hub,
            metric_cache,
            tip,
        })
    }

    /// The block cache, shared with the reader and the invalidation coordinator.
    pub fn block_cache(&self) -> Arc<BlockCache> {
        self.blocks.clone()
    }

    /// Read-through access to blocks and transactions.
    pub fn chain_reader(&self) -> Arc<ChainReader<L>> {
        self.reader.clone()
    }

    /// Balance and token queries.
    pub fn aggregator(&self) -> Arc<BalanceAggregator<L>> {
        self.aggregator.clone()
    }

    /// Real-time subscriber rooms.
    pub fn hub(&self) -> Arc<RoomHub> {
        self.hub.clone()
    }

    /// Slow aggregates written by the refresher.
    pub fn metric_cache(&self) -> Arc<MetricCache> {
        self.metric_cache.clone()
    }

    /// The current tip.
    pub fn tip(&self) -> TipReader {
        self.tip.clone()
    }

    /// Runs the synchronizer, the upstream subscriber and the refresher until `cancel` fires.
    ///
    /// Every task finishes its current unit of work before returning. If a task panics the
    /// others are cancelled and the panic is returned.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServiceError> {
        Metrics::init();
        let Self { config, client, synchronizer, refresher, jobs: (queue, jobs), tip, .. } = self;

        let (commands_tx, commands_rx) = mpsc::channel(config.event_buffer);
        let mut tasks = JoinSet::new();
        tasks.spawn(synchronizer.run(commands_rx, cancel.clone()));
        tasks.spawn(UpstreamSubscriber::new(client, commands_tx, cancel.clone()).run());
        for _ in 0..config.refresh_workers {
            tasks.spawn(refresher.clone().run_worker(jobs.clone(), cancel.clone()));
        }
        tasks.spawn(run_schedule(queue.clone(), tip, config.refresh_interval, cancel.clone()));
        info!(
            target: "chainview::service",
            upstream = %config.upstream_url,
            refresh_workers = config.refresh_workers,
            "Chainview service started"
        );

        let mut failure = None;
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                error!(target: "chainview::service", %err, "Service task failed, shutting down");
                cancel.cancel();
                failure.get_or_insert(err);
            }
        }
        queue.close();
        info!(target: "chainview::service", "Chainview service stopped");

        failure.map_or(Ok(()), |err| Err(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{block, block_hash},
        upstream::{EventSubscription, UpstreamError},
    };
    use alloy_primitives::B256;
    use async_trait::async_trait;
    use chainview_storage::{AddressRecord, MemoryLedger};
    use chainview_types::{
        BalanceChange, BlockKey, Notification, Room, Tip, TotalBalanceChanges, UpstreamEvent,
    };
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Upstream client handing out one subscription fed by the test.
    #[derive(Debug)]
    struct FeedClient {
        tip: Tip,
        feed: Mutex<Option<mpsc::Receiver<UpstreamEvent>>>,
    }

    #[derive(Debug)]
    struct FeedSubscription {
        events: mpsc::Receiver<UpstreamEvent>,
    }

    #[async_trait]
    impl EventSubscription for FeedSubscription {
        async fn next_event(&mut self) -> Option<Result<UpstreamEvent, UpstreamError>> {
            self.events.recv().await.map(Ok)
        }

        async fn unsubscribe(self: Box<Self>) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    #[async_trait]
    impl UpstreamClient for FeedClient {
        async fn subscribe(&self) -> Result<Box<dyn EventSubscription>, UpstreamError> {
            let events = self.feed.lock().take().ok_or(UpstreamError::Closed)?;
            Ok(Box::new(FeedSubscription { events }))
        }

        async fn current_tip(&self) -> Result<Tip, UpstreamError> {
            Ok(self.tip)
        }
    }

    fn change(transaction_id: u64, block_height: u32, value: i64) -> BalanceChange {
        BalanceChange {
            address_id: 1,
            transaction_id,
            tx_id: B256::with_last_byte(transaction_id as u8),
            block_height,
            index_in_block: 0,
            value,
        }
    }

    fn ledger(tip: u32) -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.update(|state| {
            for height in 0..=tip {
                state.insert_block(block(height, 0));
            }
            state.addresses.insert(
                1,
                AddressRecord { address: "qaddr1".into(), create_height: 1, is_contract: false },
            );
        });
        ledger
    }

    fn start(
        ledger: Arc<MemoryLedger>,
        tip: Tip,
    ) -> (ChainviewService<MemoryLedger, FeedClient>, mpsc::Sender<UpstreamEvent>) {
        let (feed_tx, feed_rx) = mpsc::channel(16);
        let client = Arc::new(FeedClient { tip, feed: Mutex::new(Some(feed_rx)) });
        let service = ChainviewService::new(Config::default(), ledger, client).unwrap();
        (service, feed_tx)
    }

    async fn wait_for_height(tip: &mut TipReader, height: u32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while tip.current().is_none_or(|current| current.height != height) {
                if tip.changed().await.is_none() {
                    break;
                }
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = Config { refresh_workers: 0, ..Default::default() };
        let client = Arc::new(FeedClient { tip: block(0, 0).tip(), feed: Mutex::new(None) });
        assert!(matches!(
            ChainviewService::new(config, ledger(0), client),
            Err(ServiceError::Config(ConfigError::Zero("refresh_workers")))
        ));
    }

    #[tokio::test]
    async fn test_reorg_from_100_to_97_evicts_retired_blocks() {
        let ledger = ledger(100);
        let (service, feed) = start(ledger.clone(), block(100, 0).tip());
        let reader = service.chain_reader();
        let blocks = service.block_cache();
        let mut tip = service.tip();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(service.run(cancel.clone()));

        wait_for_height(&mut tip, 100).await;
        for height in 98..=100 {
            let block = reader.block(BlockKey::Height(height)).await.unwrap().unwrap();
            assert_eq!(block.confirmations, 101 - height);
        }
        assert!(blocks.peek(BlockKey::Hash(block_hash(99, 0))).is_some());

        ledger.update(|state| state.retire_above(97));
        feed.send(UpstreamEvent::Reorg(block(97, 0))).await.unwrap();
        wait_for_height(&mut tip, 97).await;

        for height in 98..=100 {
            assert!(blocks.peek(BlockKey::Height(height)).is_none());
            assert!(blocks.peek(BlockKey::Hash(block_hash(height, 0))).is_none());
            assert!(reader.block(BlockKey::Height(height)).await.unwrap().is_none());
        }
        assert_eq!(tip.current().unwrap().height, 97);
        let kept = reader.block(BlockKey::Height(97)).await.unwrap().unwrap();
        assert_eq!(kept.view.next_hash, None);
        assert_eq!(kept.confirmations, 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_new_block_refreshes_cached_totals() {
        let ledger = ledger(20);
        ledger.update(|state| {
            state.balance_changes = vec![change(1, 10, 10), change(2, 11, -3), change(3, 12, 5)];
        });
        let (service, feed) = start(ledger.clone(), block(20, 0).tip());
        let aggregator = service.aggregator();
        let hub = service.hub();
        let mut tip = service.tip();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(service.run(cancel.clone()));
        wait_for_height(&mut tip, 20).await;

        let totals = aggregator.total_balance_changes(&[1]).await.unwrap();
        assert_eq!(totals, TotalBalanceChanges { total_received: 15, total_sent: 3 });
        assert_eq!(totals.balance(), 12);

        let (connection, mut notifications) = hub.connect();
        hub.subscribe(connection, Room::Address("qaddr1".into()));

        let mut next = block(21, 0);
        next.transactions = vec![change(4, 21, -2).tx_id];
        ledger.update(|state| {
            state.insert_block(next.clone());
            state.balance_changes.push(change(4, 21, -2));
        });
        feed.send(UpstreamEvent::Block(next.clone())).await.unwrap();

        // The address notification is sent after the block's invalidation.
        let notification = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notification = notifications.recv().await.unwrap();
                if let Notification::AddressTransaction { .. } = notification.as_ref() {
                    return notification;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(
            *notification,
            Notification::AddressTransaction { address: "qaddr1".into(), id: next.transactions[0] }
        );
        let totals = aggregator.total_balance_changes(&[1]).await.unwrap();
        assert_eq!(totals, TotalBalanceChanges { total_received: 15, total_sent: 5 });

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
