//! Rows read from the external ledger store.

use crate::TxId;
use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Sentinel block height marking rows that belong to mempool transactions.
pub const UNCONFIRMED_HEIGHT: u32 = 0xffff_ffff;

/// Internal identifier of an address in the ledger store.
pub type AddressId = u64;

/// Signed balance movement of one address in one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    /// Address whose balance changed.
    pub address_id: AddressId,
    /// Internal transaction id, used for grouping.
    pub transaction_id: u64,
    /// Public transaction id.
    pub tx_id: TxId,
    /// Block height, [`UNCONFIRMED_HEIGHT`] for mempool rows.
    pub block_height: u32,
    /// Position of the transaction inside its block.
    pub index_in_block: u32,
    /// Signed change, in satoshis.
    pub value: i64,
}

impl BalanceChange {
    /// Returns `true` if the row belongs to a mined block.
    pub const fn is_confirmed(&self) -> bool {
        self.block_height > 0 && self.block_height != UNCONFIRMED_HEIGHT
    }

    /// Ordering key of the row inside the chain.
    pub const fn position(&self) -> (u32, u32, u64) {
        (self.block_height, self.index_in_block, self.transaction_id)
    }
}

/// An unspent output, used for maturity and staking windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutput {
    /// Owner of the output.
    pub address_id: AddressId,
    /// Height the output was created at.
    pub block_height: u32,
    /// Value, in satoshis.
    pub value: i64,
    /// Whether the output was created by a coinstake transaction.
    pub is_stake: bool,
}

/// Block header fields referenced by histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderRef {
    /// Block height.
    pub height: u32,
    /// Block hash.
    pub hash: B256,
    /// Block timestamp.
    pub timestamp: u64,
}

/// Token metadata of a QRC20 or QRC721 contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    /// Contract address.
    pub contract: Address,
    /// Token name.
    pub name: String,
    /// Token symbol.
    pub symbol: String,
    /// Decimal places, zero for QRC721.
    pub decimals: u8,
}

/// Confirmed QRC20 balance of one holder, from the materialized balance table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceRow {
    /// Token.
    pub token: TokenInfo,
    /// Holder.
    pub holder: Address,
    /// Balance in token base units.
    pub balance: U256,
}

/// A pending EVM call to a QRC20 contract, taken from receipts at [`UNCONFIRMED_HEIGHT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvmCall {
    /// Mempool transaction carrying the call.
    pub tx_id: TxId,
    /// Called token.
    pub token: TokenInfo,
    /// Caller.
    pub sender: Address,
    /// Call data.
    pub byte_code: Bytes,
}

/// Number of QRC721 tokens held in one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Qrc721Holding {
    /// Token.
    pub token: TokenInfo,
    /// Holder.
    pub holder: Address,
    /// Number of tokens held.
    pub count: u64,
}

/// One row of the rich list snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichListEntry {
    /// Address id.
    pub address_id: AddressId,
    /// Address string.
    pub address: String,
    /// Balance at snapshot time.
    pub balance: i64,
}

/// An address touched by a transaction, as indexed by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchedAddress {
    /// Address id.
    pub address_id: AddressId,
    /// Address string, used as the broadcast room name.
    pub address: String,
}
