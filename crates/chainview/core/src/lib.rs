//! Chain-tip synchronization and derived-state caches for the chainview explorer backend.
//!
//! The [`TipSynchronizer`] consumes upstream node events in order and is the single writer of
//! the current tip. On every event it drives the [`InvalidationCoordinator`] over the
//! derived-state caches and publishes a [`ChainEvent`] on the [`EventBus`], whose handlers
//! broadcast to subscriber rooms and schedule statistics refreshes. Readers go through the
//! [`ChainReader`] and the [`BalanceAggregator`], which never wait on event processing.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod config;
pub use config::{
    Config, ConfigError, DEFAULT_BALANCE_CACHE_CAPACITY, DEFAULT_BLOCK_CACHE_CAPACITY,
    DEFAULT_MATURITY_WINDOW, DEFAULT_TRANSACTION_CACHE_CAPACITY,
};

mod metrics;

mod tip;
pub use tip::{TipReader, TipWriter, tip_channel};

pub mod cache;
pub use cache::{BalanceCache, BlockCache, ChainReader, TransactionCache};

mod invalidation;
pub use invalidation::{InvalidationCoordinator, InvalidationReport};

mod bus;
pub use bus::{
    ChainEvent, ChainEventHandler, EventBus, HandlerError, WorkQueue, WorkReceiver, work_queue,
};

pub mod sync;
pub use sync::{SyncCommand, SyncState, TipSynchronizer};

pub mod upstream;

pub mod aggregator;
pub use aggregator::{AddressQuery, AggregatorError, BalanceAggregator, HistoryOptions};

pub mod broadcast;
pub use broadcast::{BroadcastFanout, ConnectionId, Delivery, RoomHub};

pub mod refresher;
pub use refresher::{MetricCache, RefreshError, RefreshJob, StatisticsRefresher};

mod service;
pub use service::{ChainviewService, ServiceError};

#[cfg(test)]
mod test_utils;
