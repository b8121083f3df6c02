use crate::{Tip, TxId};
use alloy_primitives::B256;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Lookup key for a block: either alias resolves to the same logical block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From)]
pub enum BlockKey {
    /// Block height.
    #[display("height {_0}")]
    Height(u32),
    /// Block hash.
    #[display("hash {_0}")]
    Hash(B256),
}

/// Materialized block summary, as stored in the block cache.
///
/// Only immutable facts are kept here. `confirmations` depends on the current tip and is
/// computed when the view is served, see [`crate::Confirmed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    /// Block hash.
    pub hash: B256,
    /// Block height.
    pub height: u32,
    /// Hash of the parent block.
    pub prev_hash: B256,
    /// Hash of the following block, if one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hash: Option<B256>,
    /// Block timestamp, in seconds.
    pub timestamp: u64,
    /// Seconds since the parent block, `None` for genesis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Serialized size in bytes.
    pub size: u32,
    /// Block weight.
    pub weight: u32,
    /// Address of the miner or staker.
    pub miner: String,
    /// Block reward, in satoshis.
    pub reward: i64,
    /// Transaction ids, in block order.
    pub transactions: Vec<TxId>,
    /// Whether the block was produced by proof-of-stake.
    pub proof_of_stake: bool,
    /// Block difficulty.
    pub difficulty: f64,
}

impl BlockView {
    /// The [`Tip`] this block represents once it becomes canonical head.
    pub const fn tip(&self) -> Tip {
        Tip::new(self.height, self.hash, self.timestamp)
    }
}
