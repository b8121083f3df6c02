use crate::{BlockView, Tip, TxId};
use serde::{Deserialize, Serialize};

/// An event emitted by the upstream node subscription.
///
/// On the wire every event is an object `{"event": <kind>, "payload": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum UpstreamEvent {
    /// The chain was extended.
    Tip(Tip),
    /// A new canonical block was materialized by the indexer.
    Block(BlockView),
    /// A fork was resolved; the payload is the new tip and every block above it is retired.
    Reorg(BlockView),
    /// A new transaction entered the mempool.
    MempoolTransaction(TxId),
}

impl UpstreamEvent {
    /// Short name of the event kind, used in logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tip(_) => "tip",
            Self::Block(_) => "block",
            Self::Reorg(_) => "reorg",
            Self::MempoolTransaction(_) => "mempool-transaction",
        }
    }
}
