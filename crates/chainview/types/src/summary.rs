//! Derived views returned by the aggregator.

use crate::{TokenInfo, TxId};
use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

/// Confirmed totals of an address set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalBalanceChanges {
    /// Sum of all inflows.
    pub total_received: i64,
    /// Sum of all outflows, as a positive number.
    pub total_sent: i64,
}

impl TotalBalanceChanges {
    /// Confirmed balance.
    pub const fn balance(&self) -> i64 {
        self.total_received - self.total_sent
    }
}

/// Pending token movements of an address set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnconfirmedTokenDelta {
    /// Pending inflow.
    pub received: U256,
    /// Pending outflow.
    pub sent: U256,
}

/// QRC20 balance with its unconfirmed overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Qrc20Balance {
    /// Token.
    #[serde(flatten)]
    pub token: TokenInfo,
    /// Confirmed balance.
    pub balance: U256,
    /// Pending movements.
    pub unconfirmed: UnconfirmedTokenDelta,
    /// Set when the address set only touches the token through pending transfers.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_unconfirmed: bool,
}

/// QRC721 holdings in one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qrc721Balance {
    /// Token.
    #[serde(flatten)]
    pub token: TokenInfo,
    /// Number of tokens held.
    pub count: u64,
}

/// Everything the explorer shows on an address page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSummary {
    /// `total_received - total_sent`.
    pub balance: i64,
    /// Confirmed inflow.
    pub total_received: i64,
    /// Confirmed outflow.
    pub total_sent: i64,
    /// Mempool delta.
    pub unconfirmed: i64,
    /// Immature coinstake outputs.
    pub staking: i64,
    /// Spendable mature outputs.
    pub mature: i64,
    /// QRC20 balances.
    pub qrc20_balances: Vec<Qrc20Balance>,
    /// QRC721 holdings.
    pub qrc721_balances: Vec<Qrc721Balance>,
    /// Position in the rich list snapshot, single address queries only.
    pub ranking: Option<u64>,
    /// Confirmed transactions touching the set.
    pub transaction_count: u64,
    /// Blocks produced by the set.
    pub blocks_mined: u64,
}

/// Block reference attached to a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block hash.
    pub hash: B256,
    /// Block height.
    pub height: u32,
    /// Block timestamp.
    pub timestamp: u64,
}

/// One transaction in an address balance history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceHistoryEntry {
    /// Transaction id.
    pub id: TxId,
    /// Containing block, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockRef>,
    /// Net change of the address set in this transaction.
    pub amount: i64,
    /// Balance of the address set after this transaction.
    pub balance: i64,
}

/// A page of the balance history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceHistory {
    /// Number of matching transactions.
    pub total_count: u64,
    /// The requested page.
    pub transactions: Vec<BalanceHistoryEntry>,
}

/// One row of a rich list page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichListRow {
    /// Address string.
    pub address: String,
    /// Balance at snapshot time.
    pub balance: i64,
}

/// A page of the rich list snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichListPage {
    /// Number of rows in the snapshot.
    pub total_count: u64,
    /// The requested page, richest first.
    pub list: Vec<RichListRow>,
}
