use crate::{Tip, UNCONFIRMED_HEIGHT};
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Transaction identifier.
pub type TxId = B256;

/// A spent output referenced by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    /// Id of the transaction that created the spent output.
    pub prev_tx_id: TxId,
    /// Output index in that transaction.
    pub output_index: u32,
    /// Owner of the spent output, if it has one.
    pub address: Option<String>,
    /// Spent value, in satoshis.
    pub value: i64,
}

/// An output created by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutput {
    /// Recipient, if the script pays to an address.
    pub address: Option<String>,
    /// Value, in satoshis.
    pub value: i64,
    /// Script type, e.g. `pubkeyhash` or `evm_call`.
    pub script_type: String,
}

/// EVM execution receipt attached to a contract output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmReceiptView {
    /// Caller of the contract.
    pub sender: Address,
    /// Called contract.
    pub contract_address: Address,
    /// Gas consumed by the call.
    pub gas_used: u64,
    /// Execution status, `None` on success.
    pub excepted: String,
}

/// Materialized transaction view.
///
/// `block_height` is [`UNCONFIRMED_HEIGHT`] while the transaction sits in the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    /// Transaction id.
    pub id: TxId,
    /// Height of the containing block.
    pub block_height: u32,
    /// Hash of the containing block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<B256>,
    /// Timestamp of the containing block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Spent outputs.
    pub inputs: Vec<TransactionInput>,
    /// Created outputs.
    pub outputs: Vec<TransactionOutput>,
    /// EVM receipts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub receipts: Vec<EvmReceiptView>,
    /// Serialized size in bytes.
    pub size: u32,
    /// Paid fees, in satoshis.
    pub fees: i64,
}

impl TransactionView {
    /// Returns `true` once the transaction is part of a block.
    pub const fn is_confirmed(&self) -> bool {
        self.block_height != UNCONFIRMED_HEIGHT
    }

    /// Confirmations of this transaction relative to `tip`, zero while unconfirmed.
    pub const fn confirmations(&self, tip: &Tip) -> u32 {
        if self.is_confirmed() { tip.confirmations(self.block_height) } else { 0 }
    }
}

/// The newest transactions, pending first, with the total number of known transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestTransactions {
    /// Confirmed plus pending transactions.
    pub total_count: u64,
    /// Newest first.
    pub transactions: Vec<TransactionView>,
}
