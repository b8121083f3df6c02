//! Slow aggregates recomputed by the statistics refresher.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Activity over the last 24 hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics24h {
    /// Transactions mined.
    pub transaction_count: u64,
    /// Value moved, in satoshis.
    pub transaction_volume: i64,
    /// Average seconds between blocks.
    pub average_block_time: f64,
}

/// Transaction counts of one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTransactions {
    /// Start of the day, in seconds.
    pub timestamp: u64,
    /// Transactions mined that day.
    pub transactions_count: u64,
    /// Contract transactions mined that day.
    pub contract_transactions_count: u64,
    /// Value moved, in satoshis.
    pub transaction_volume: i64,
}

/// One bucket of the block interval histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockInterval {
    /// Seconds between two consecutive blocks.
    pub interval: u64,
    /// Number of blocks with this interval.
    pub count: u64,
    /// Share of all blocks.
    pub percentage: f64,
}

/// Cumulative address count at the end of one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressGrowth {
    /// Start of the day, in seconds.
    pub timestamp: u64,
    /// Addresses created up to and including that day.
    pub count: u64,
}

/// Holder and transfer counts of one token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStatistics {
    /// Token contract.
    pub contract: Address,
    /// Holders with a non-zero balance.
    pub holders: u64,
    /// Transfer events emitted.
    pub transactions: u64,
}
