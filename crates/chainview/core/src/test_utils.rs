//! Shared fixtures for unit tests.

use alloy_primitives::{Address, B256};
use chainview_storage::{
    BalanceReader, BlockReader, RichListStore, StorageError, TokenReader, TransactionReader,
};
use chainview_types::{
    AddressId, BalanceChange, BlockKey, BlockView, HeaderRef, PendingEvmCall, Qrc721Holding,
    RichListEntry, TokenBalanceRow, TokenInfo, TouchedAddress, TransactionView, TxId,
    UnspentOutput,
};
use mockall::mock;

mock! {
    #[derive(Debug)]
    pub Ledger {}

    #[async_trait::async_trait]
    impl BlockReader for Ledger {
        async fn block(&self, key: BlockKey) -> Result<Option<BlockView>, StorageError>;
        async fn block_hash(&self, height: u32) -> Result<Option<B256>, StorageError>;
        async fn headers(&self, heights: &[u32]) -> Result<Vec<HeaderRef>, StorageError>;
        async fn block_address_transactions(&self, height: u32) -> Result<Vec<Vec<TouchedAddress>>, StorageError>;
        async fn blocks_mined(&self, addresses: &[AddressId]) -> Result<u64, StorageError>;
    }

    #[async_trait::async_trait]
    impl TransactionReader for Ledger {
        async fn transaction(&self, id: TxId) -> Result<Option<TransactionView>, StorageError>;
        async fn mempool_transaction_addresses(&self, id: TxId) -> Result<Vec<TouchedAddress>, StorageError>;
    }

    #[async_trait::async_trait]
    impl BalanceReader for Ledger {
        async fn confirmed_balance_changes(&self, addresses: &[AddressId]) -> Result<Vec<BalanceChange>, StorageError>;
        async fn unconfirmed_balance_changes(&self, addresses: &[AddressId]) -> Result<Vec<BalanceChange>, StorageError>;
        async fn unspent_outputs(&self, addresses: &[AddressId]) -> Result<Vec<UnspentOutput>, StorageError>;
    }

    #[async_trait::async_trait]
    impl TokenReader for Ledger {
        async fn token(&self, contract: Address) -> Result<Option<TokenInfo>, StorageError>;
        async fn token_balances(&self, holders: &[Address], token: Option<Address>) -> Result<Vec<TokenBalanceRow>, StorageError>;
        async fn pending_evm_calls(&self, token: Option<Address>) -> Result<Vec<PendingEvmCall>, StorageError>;
        async fn qrc721_holdings(&self, holders: &[Address]) -> Result<Vec<Qrc721Holding>, StorageError>;
    }

    #[async_trait::async_trait]
    impl RichListStore for Ledger {
        async fn rich_list_candidates(&self, height: u32) -> Result<Vec<RichListEntry>, StorageError>;
        async fn replace_rich_list(&self, entries: Vec<RichListEntry>) -> Result<(), StorageError>;
        async fn rich_list_rank(&self, address: AddressId) -> Result<Option<u64>, StorageError>;
        async fn rich_list_page(&self, offset: usize, limit: usize) -> Result<(u64, Vec<RichListEntry>), StorageError>;
    }
}

/// Hash of the block at `height` on fork `fork`.
pub(crate) fn block_hash(height: u32, fork: u8) -> B256 {
    let mut hash = [fork; 32];
    hash[28..].copy_from_slice(&height.to_be_bytes());
    B256::from(hash)
}

/// A block at `height` on fork `fork`, linked to its parent on the same fork.
pub(crate) fn block(height: u32, fork: u8) -> BlockView {
    BlockView {
        hash: block_hash(height, fork),
        height,
        prev_hash: block_hash(height.saturating_sub(1), fork),
        next_hash: None,
        timestamp: 1_600_000_000 + u64::from(height) * 32,
        interval: Some(32),
        size: 1_000,
        weight: 4_000,
        miner: "qminer".to_string(),
        reward: 400_000_000,
        transactions: Vec::new(),
        proof_of_stake: true,
        difficulty: 1.0,
    }
}

/// A transaction mined at `block_height`.
pub(crate) fn confirmed_tx(byte: u8, block_height: u32) -> TransactionView {
    TransactionView {
        id: B256::repeat_byte(byte),
        block_height,
        block_hash: Some(block_hash(block_height, 0)),
        timestamp: Some(1_600_000_000),
        inputs: Vec::new(),
        outputs: Vec::new(),
        receipts: Vec::new(),
        size: 250,
        fees: 1_000,
    }
}

/// A touched address with a derived string form.
pub(crate) fn touched(address_id: AddressId) -> TouchedAddress {
    TouchedAddress { address_id, address: format!("qaddr{address_id}") }
}
