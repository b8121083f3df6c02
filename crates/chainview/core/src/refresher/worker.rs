use crate::{
    broadcast::RoomHub,
    bus::{ChainEvent, ChainEventHandler, HandlerError, WorkQueue, WorkReceiver},
    metrics::Metrics,
    refresher::{MetricCache, RefreshJob},
    tip::TipReader,
};
use alloy_primitives::B256;
use async_trait::async_trait;
use chainview_storage::{RichListStore, StatisticsSource, StorageError};
use chainview_types::{Notification, Room};
use derive_more::Constructor;
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime, SystemTimeError, UNIX_EPOCH},
};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Transactions in the `recent-transactions` push.
const RECENT_TRANSACTIONS: usize = 10;

/// Transactions in the `latest-transactions` push.
const LATEST_TRANSACTIONS: usize = 20;

/// Errors raised by a refresh job. The previous value stays visible on failure.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The result could not be encoded into the metric cache.
    #[error("failed to encode metric: {0}")]
    Encode(#[from] serde_json::Error),
    /// The job depends on the tip, which is not known yet.
    #[error("no tip known yet")]
    NoTip,
    /// The system clock is before the unix epoch.
    #[error(transparent)]
    Clock(#[from] SystemTimeError),
}

/// Result of a [`StatisticsRefresher::refresh`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The job ran to completion.
    Completed,
    /// The same job was already running; nothing was done.
    Skipped,
}

/// Recomputes slow aggregates and publishes them to readers.
#[derive(Debug)]
pub struct StatisticsRefresher<S> {
    store: Arc<S>,
    metrics: Arc<MetricCache>,
    tip: TipReader,
    hub: Arc<RoomHub>,
    running: Mutex<HashSet<RefreshJob>>,
}

/// Releases a job's in-flight slot when dropped.
struct RunningGuard<'a> {
    running: &'a Mutex<HashSet<RefreshJob>>,
    job: RefreshJob,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.lock().remove(&self.job);
    }
}

impl<S> StatisticsRefresher<S>
where
    S: RichListStore + StatisticsSource + 'static,
{
    /// Creates a refresher writing into `metrics` and pushing to `hub`.
    pub fn new(store: Arc<S>, metrics: Arc<MetricCache>, tip: TipReader, hub: Arc<RoomHub>) -> Self {
        Self { store, metrics, tip, hub, running: Mutex::new(HashSet::new()) }
    }

    /// Runs `job` unless the same job is already in flight.
    pub async fn refresh(&self, job: RefreshJob) -> Result<RefreshOutcome, RefreshError> {
        if !self.running.lock().insert(job) {
            debug!(target: "chainview::refresher", %job, "Job already running, skipping");
            return Ok(RefreshOutcome::Skipped);
        }
        let _guard = RunningGuard { running: &self.running, job };

        let result = self.run_job(job).await;
        Metrics::record_refresh(job.metric_name(), result.is_ok());
        result.map(|()| RefreshOutcome::Completed)
    }

    async fn run_job(&self, job: RefreshJob) -> Result<(), RefreshError> {
        match job {
            RefreshJob::RichList => {
                let tip = self.tip.current().ok_or(RefreshError::NoTip)?;
                let entries = self.store.rich_list_candidates(tip.height).await?;
                let rows = entries.len();
                self.store.replace_rich_list(entries).await?;
                info!(target: "chainview::refresher", height = tip.height, rows, "Rich list rebuilt");
            }
            RefreshJob::Statistics24h => {
                let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
                let statistics = self.store.statistics_24h(now).await?;
                self.metrics.set(job.metric_name(), &statistics)?;
                self.hub.publish(&Room::Blockchain, Notification::Statistics24h(statistics));
            }
            RefreshJob::DailyTransactions => {
                let daily = self.store.daily_transactions().await?;
                self.metrics.set(job.metric_name(), &daily)?;
            }
            RefreshJob::BlockIntervals => {
                let height = self.tip.current().ok_or(RefreshError::NoTip)?.height;
                let intervals = self.store.block_intervals(height).await?;
                self.metrics.set(job.metric_name(), &intervals)?;
            }
            RefreshJob::AddressGrowth => {
                let growth = self.store.address_growth().await?;
                self.metrics.set(job.metric_name(), &growth)?;
            }
            RefreshJob::TokenStatistics => {
                let statistics = self.store.token_statistics().await?;
                self.metrics.set(job.metric_name(), &statistics)?;
            }
            RefreshJob::Qrc721Statistics => {
                let statistics = self.store.qrc721_statistics().await?;
                self.metrics.set(job.metric_name(), &statistics)?;
            }
            RefreshJob::BlockTime => {
                let timestamp = self.store.block_time().await?;
                self.metrics.set(job.metric_name(), &timestamp)?;
                self.hub.publish(&Room::Blockchain, Notification::BlockTime(timestamp));
            }
            RefreshJob::Difficulty => {
                let difficulty = self.store.difficulty().await?;
                self.metrics.set(job.metric_name(), &difficulty)?;
                self.hub.publish(&Room::Blockchain, Notification::Difficulty(difficulty));
            }
            RefreshJob::StakeWeight => {
                let weight = self.store.stake_weight().await?;
                self.metrics.set(job.metric_name(), &weight)?;
                self.hub.publish(&Room::Blockchain, Notification::StakeWeight(weight));
            }
            RefreshJob::AddressCount => {
                let count = self.store.address_count().await?;
                self.metrics.set(job.metric_name(), &count)?;
                self.hub.publish(&Room::Blockchain, Notification::AddressCount(count));
            }
            RefreshJob::TransactionLists => {
                let recent = self.store.recent_transactions(RECENT_TRANSACTIONS).await?;
                let latest = self.store.latest_transactions(LATEST_TRANSACTIONS).await?;
                self.hub.publish(&Room::Transactions, Notification::RecentTransactions(recent));
                self.hub.publish(&Room::Transactions, Notification::LatestTransactions(latest));
            }
        }
        debug!(target: "chainview::refresher", %job, "Refresh completed");
        Ok(())
    }

    /// Pulls jobs from `jobs` until cancelled or the queue closes.
    ///
    /// Several workers may share one receiver; each job is run by one of them.
    pub async fn run_worker(self: Arc<Self>, jobs: WorkReceiver<RefreshJob>, cancel: CancellationToken) {
        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = jobs.next() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            if let Err(err) = self.refresh(job).await {
                warn!(target: "chainview::refresher", %job, %err, "Refresh failed, keeping previous value");
            }
        }
        debug!(target: "chainview::refresher", "Refresh worker stopped");
    }
}

/// Submits the scheduled jobs every `period`, if the tip changed since the last submission.
///
/// The first submission happens as soon as a tip is known, and also warms the per-block jobs.
pub async fn run_schedule(
    queue: WorkQueue<RefreshJob>,
    mut tip: TipReader,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_hash: Option<B256> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            Some(_) = tip.changed(), if last_hash.is_none() => {}
        }

        let Some(current) = tip.current() else {
            continue;
        };
        if last_hash == Some(current.hash) {
            continue;
        }
        let warm: &[RefreshJob] = if last_hash.is_none() { &RefreshJob::PER_BLOCK } else { &[] };
        last_hash = Some(current.hash);

        for &job in RefreshJob::SCHEDULED.iter().chain(warm) {
            if queue.try_submit(job).is_err() {
                warn!(target: "chainview::refresher", %job, "Refresh queue full, job not scheduled");
            }
        }
        debug!(target: "chainview::refresher", height = current.height, "Scheduled statistics refresh");
    }
}

/// Submits [`RefreshJob::PER_BLOCK`] on every new block and [`RefreshJob::PER_TIP`] on every
/// tip advance.
#[derive(Debug, Clone, Constructor)]
pub struct RefreshTrigger {
    queue: WorkQueue<RefreshJob>,
}

#[async_trait]
impl ChainEventHandler for RefreshTrigger {
    fn name(&self) -> &'static str {
        "refresh"
    }

    async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError> {
        let jobs: &[RefreshJob] = match event {
            ChainEvent::NewBlock { .. } => &RefreshJob::PER_BLOCK,
            ChainEvent::TipAdvanced(_) => &RefreshJob::PER_TIP,
            _ => return Ok(()),
        };
        let dropped: Vec<String> = jobs
            .iter()
            .filter_map(|job| self.queue.try_submit(*job).err())
            .map(|job| job.to_string())
            .collect();
        if !dropped.is_empty() {
            return Err(HandlerError {
                handler: self.name(),
                event: event.kind(),
                reason: format!("refresh queue full, dropped {}", dropped.join(", ")),
            });
        }
        Ok(())
    }
}
