use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// The highest block currently considered canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tip {
    /// Height of the tip block.
    pub height: u32,
    /// Hash of the tip block.
    pub hash: B256,
    /// Block timestamp, in seconds.
    pub timestamp: u64,
}

impl Tip {
    /// Creates a new [`Tip`].
    pub const fn new(height: u32, hash: B256, timestamp: u64) -> Self {
        Self { height, hash, timestamp }
    }

    /// Number of confirmations of a block mined at `block_height`, seen from this tip.
    ///
    /// Blocks above the tip (possible while a reorg is still being published) report zero.
    pub const fn confirmations(&self, block_height: u32) -> u32 {
        if block_height > self.height { 0 } else { self.height - block_height + 1 }
    }
}
