//! Typed event bus between the synchronizer and its downstream consumers.
//!
//! Two delivery modes exist: [`EventBus`] hands every [`ChainEvent`] to all registered
//! handlers, and [`WorkQueue`] hands each job to exactly one worker of a pool.

use crate::metrics::Metrics;
use async_trait::async_trait;
use chainview_types::{BlockView, Tip, TouchedAddress, TransactionView, TxId};
use futures::future::join_all;
use std::{fmt::Debug, sync::Arc};
use thiserror::Error;
use tracing::warn;

/// A state change published by the synchronizer, after the tip itself was updated.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEvent {
    /// The tip moved forward without a new materialized block.
    TipAdvanced(Arc<Tip>),
    /// A canonical block was materialized and is now the tip.
    NewBlock {
        /// The block.
        block: Arc<BlockView>,
        /// Addresses touched by each transaction, indexed by position in the block.
        touched: Arc<Vec<Vec<TouchedAddress>>>,
    },
    /// A reorg retired every block above `tip`.
    Reorged {
        /// The new tip.
        tip: Arc<Tip>,
        /// Tip height before the reorg.
        original_height: u32,
    },
    /// A transaction entered the mempool.
    MempoolTransaction {
        /// Transaction id.
        id: TxId,
        /// The transaction, if the ledger already materialized it.
        transaction: Option<Arc<TransactionView>>,
        /// Addresses touched by the transaction.
        touched: Arc<Vec<TouchedAddress>>,
    },
}

impl ChainEvent {
    /// Short name of the event kind, used in logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TipAdvanced(_) => "tip",
            Self::NewBlock { .. } => "block",
            Self::Reorged { .. } => "reorg",
            Self::MempoolTransaction { .. } => "mempool-transaction",
        }
    }
}

/// Error returned by a [`ChainEventHandler`].
#[derive(Debug, Error)]
#[error("{handler} failed to handle {event}: {reason}")]
pub struct HandlerError {
    /// Name of the failing handler.
    pub handler: &'static str,
    /// Kind of the event being handled.
    pub event: &'static str,
    /// Failure description.
    pub reason: String,
}

/// A consumer of [`ChainEvent`]s.
#[async_trait]
pub trait ChainEventHandler: Debug + Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Handles one event. Errors are logged by the bus and never stop delivery to others.
    async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError>;
}

/// Broadcast-to-all dispatcher of [`ChainEvent`]s.
#[derive(Debug, Default, Clone)]
pub struct EventBus {
    handlers: Vec<Arc<dyn ChainEventHandler>>,
}

impl EventBus {
    /// Creates a bus with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler. Handlers registered later run concurrently with earlier ones.
    pub fn register(&mut self, handler: Arc<dyn ChainEventHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Delivers `event` to every handler and waits for all of them to finish.
    ///
    /// Returns the number of handlers that failed.
    pub async fn publish(&self, event: &ChainEvent) -> usize {
        let results = join_all(self.handlers.iter().map(|handler| handler.handle(event))).await;

        let mut failed = 0;
        for (handler, result) in self.handlers.iter().zip(results) {
            if let Err(err) = result {
                failed += 1;
                metrics::counter!(Metrics::HANDLER_ERROR_TOTAL, "handler" => handler.name())
                    .increment(1);
                warn!(
                    target: "chainview::bus",
                    handler = handler.name(),
                    event = event.kind(),
                    %err,
                    "Chain event handler failed"
                );
            }
        }
        failed
    }
}

/// Creates a bounded queue whose jobs are each received by exactly one worker.
pub fn work_queue<J>(capacity: usize) -> (WorkQueue<J>, WorkReceiver<J>) {
    let (tx, rx) = async_channel::bounded(capacity);
    (WorkQueue { tx }, WorkReceiver { rx })
}

/// Producer side of a [`work_queue`].
#[derive(Debug)]
pub struct WorkQueue<J> {
    tx: async_channel::Sender<J>,
}

impl<J> Clone for WorkQueue<J> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<J> WorkQueue<J> {
    /// Queues `job` without waiting. Returns the job back if the queue is full or closed.
    pub fn try_submit(&self, job: J) -> Result<(), J> {
        self.tx.try_send(job).map_err(|err| err.into_inner())
    }

    /// Stops accepting jobs. Workers drain what is already queued.
    pub fn close(&self) -> bool {
        self.tx.close()
    }
}

/// Consumer side of a [`work_queue`]; clone it once per worker.
#[derive(Debug)]
pub struct WorkReceiver<J> {
    rx: async_channel::Receiver<J>,
}

impl<J> Clone for WorkReceiver<J> {
    fn clone(&self) -> Self {
        Self { rx: self.rx.clone() }
    }
}

impl<J> WorkReceiver<J> {
    /// Waits for the next job. Returns `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<J> {
        self.rx.recv().await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use mockall::mock;

    mock! {
        #[derive(Debug)]
        pub Handler {}

        #[async_trait::async_trait]
        impl ChainEventHandler for Handler {
            fn name(&self) -> &'static str;
            async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError>;
        }
    }

    fn tip_event() -> ChainEvent {
        ChainEvent::TipAdvanced(Arc::new(Tip::new(5, B256::ZERO, 0)))
    }

    #[tokio::test]
    async fn test_publish_reaches_every_handler() {
        let mut bus = EventBus::new();
        for _ in 0..2 {
            let mut handler = MockHandler::new();
            handler.expect_name().return_const("mock");
            handler.expect_handle().times(1).returning(|_| Ok(()));
            bus.register(Arc::new(handler));
        }
        assert_eq!(bus.publish(&tip_event()).await, 0);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_others() {
        let mut failing = MockHandler::new();
        failing.expect_name().return_const("failing");
        failing.expect_handle().times(1).returning(|event| {
            Err(HandlerError { handler: "failing", event: event.kind(), reason: "boom".into() })
        });
        let mut healthy = MockHandler::new();
        healthy.expect_name().return_const("healthy");
        healthy.expect_handle().times(1).returning(|_| Ok(()));

        let mut bus = EventBus::new();
        bus.register(Arc::new(failing));
        bus.register(Arc::new(healthy));
        assert_eq!(bus.publish(&tip_event()).await, 1);
    }

    #[tokio::test]
    async fn test_work_queue_delivers_each_job_once() {
        let (queue, receiver) = work_queue::<u32>(4);
        let other = receiver.clone();
        queue.try_submit(1).unwrap();
        queue.try_submit(2).unwrap();
        queue.close();

        let mut seen = vec![receiver.next().await.unwrap(), other.next().await.unwrap()];
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
        assert!(receiver.next().await.is_none());
        assert_eq!(queue.try_submit(3), Err(3));
    }

    #[tokio::test]
    async fn test_full_queue_returns_job() {
        let (queue, _receiver) = work_queue::<u32>(1);
        queue.try_submit(1).unwrap();
        assert_eq!(queue.try_submit(2), Err(2));
    }
}
