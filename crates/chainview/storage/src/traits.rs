use crate::StorageError;
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chainview_types::{
    AddressGrowth, AddressId, BalanceChange, BlockInterval, BlockKey, BlockView, DailyTransactions,
    HeaderRef, LatestTransactions, PendingEvmCall, Qrc721Holding, RichListEntry, Statistics24h,
    TokenBalanceRow, TokenInfo, TokenStatistics, TouchedAddress, TransactionView, TxId,
    UnspentOutput,
};
use std::fmt::Debug;

/// Provides read access to materialized blocks.
///
/// Implementations are expected to be cheap to share between tasks and safe to call
/// concurrently with each other.
#[async_trait]
pub trait BlockReader: Debug + Send + Sync {
    /// Gets the canonical block identified by `key`.
    ///
    /// # Returns
    /// * `Ok(Some(BlockView))` if a canonical block matches the key.
    /// * `Ok(None)` if no canonical block matches.
    /// * `Err(StorageError)` if the store could not be queried.
    async fn block(&self, key: BlockKey) -> Result<Option<BlockView>, StorageError>;

    /// Gets the hash of the canonical block at `height`, if one exists.
    async fn block_hash(&self, height: u32) -> Result<Option<B256>, StorageError>;

    /// Gets the headers of the canonical blocks at the given heights.
    ///
    /// Heights without a canonical block are skipped.
    async fn headers(&self, heights: &[u32]) -> Result<Vec<HeaderRef>, StorageError>;

    /// Gets the addresses touched by each transaction of the block at `height`.
    ///
    /// The outer vector is indexed by the position of the transaction inside the block.
    async fn block_address_transactions(
        &self,
        height: u32,
    ) -> Result<Vec<Vec<TouchedAddress>>, StorageError>;

    /// Counts the blocks above genesis produced by any of `addresses`.
    async fn blocks_mined(&self, addresses: &[AddressId]) -> Result<u64, StorageError>;
}

/// Provides read access to transactions.
#[async_trait]
pub trait TransactionReader: Debug + Send + Sync {
    /// Gets a confirmed or pending transaction by id.
    async fn transaction(&self, id: TxId) -> Result<Option<TransactionView>, StorageError>;

    /// Gets the addresses touched by a pending transaction.
    async fn mempool_transaction_addresses(
        &self,
        id: TxId,
    ) -> Result<Vec<TouchedAddress>, StorageError>;
}

/// Provides read access to the balance ledger.
#[async_trait]
pub trait BalanceReader: Debug + Send + Sync {
    /// Gets every confirmed balance change of `addresses`, ordered by chain position.
    async fn confirmed_balance_changes(
        &self,
        addresses: &[AddressId],
    ) -> Result<Vec<BalanceChange>, StorageError>;

    /// Gets every balance change of `addresses` recorded at the unconfirmed sentinel height.
    async fn unconfirmed_balance_changes(
        &self,
        addresses: &[AddressId],
    ) -> Result<Vec<BalanceChange>, StorageError>;

    /// Gets the unspent outputs owned by `addresses`.
    async fn unspent_outputs(
        &self,
        addresses: &[AddressId],
    ) -> Result<Vec<UnspentOutput>, StorageError>;
}

/// Provides read access to QRC20 and QRC721 token state.
#[async_trait]
pub trait TokenReader: Debug + Send + Sync {
    /// Gets metadata of the QRC20 token deployed at `contract`.
    async fn token(&self, contract: Address) -> Result<Option<TokenInfo>, StorageError>;

    /// Gets the confirmed QRC20 balances of `holders`, optionally restricted to one token.
    async fn token_balances(
        &self,
        holders: &[Address],
        token: Option<Address>,
    ) -> Result<Vec<TokenBalanceRow>, StorageError>;

    /// Gets the pending EVM calls to QRC20 contracts, optionally restricted to one token.
    async fn pending_evm_calls(
        &self,
        token: Option<Address>,
    ) -> Result<Vec<PendingEvmCall>, StorageError>;

    /// Gets the QRC721 holdings of `holders`.
    async fn qrc721_holdings(&self, holders: &[Address]) -> Result<Vec<Qrc721Holding>, StorageError>;
}

/// Combined read access to the ledger store.
///
/// Blanket-implemented for every type implementing all reader traits.
pub trait LedgerReader: BlockReader + TransactionReader + BalanceReader + TokenReader {}

impl<T> LedgerReader for T where T: BlockReader + TransactionReader + BalanceReader + TokenReader {}

/// Storage of the rich list snapshot.
///
/// The snapshot is only ever replaced as a whole: readers observe either the previous or the
/// new complete list.
#[async_trait]
pub trait RichListStore: Debug + Send + Sync {
    /// Computes the balances of every non-contract address at `height`, from the ledger.
    async fn rich_list_candidates(&self, height: u32) -> Result<Vec<RichListEntry>, StorageError>;

    /// Atomically replaces the snapshot with `entries`.
    ///
    /// On error the previous snapshot stays visible.
    async fn replace_rich_list(&self, entries: Vec<RichListEntry>) -> Result<(), StorageError>;

    /// Returns the one-based rank of `address` in the current snapshot, or `None` if absent.
    ///
    /// The lookup and the count of strictly richer rows are evaluated against the same snapshot.
    async fn rich_list_rank(&self, address: AddressId) -> Result<Option<u64>, StorageError>;

    /// Returns the size of the snapshot and the rows in `[offset, offset + limit)`, richest first.
    async fn rich_list_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(u64, Vec<RichListEntry>), StorageError>;
}

/// Source of the slow chain-wide aggregates.
#[async_trait]
pub trait StatisticsSource: Debug + Send + Sync {
    /// Activity in the 24 hours ending at `now`, in seconds.
    async fn statistics_24h(&self, now: u64) -> Result<Statistics24h, StorageError>;

    /// Per-day transaction counts, oldest first.
    async fn daily_transactions(&self) -> Result<Vec<DailyTransactions>, StorageError>;

    /// Histogram of block intervals seen from `tip_height`, shortest interval first.
    async fn block_intervals(&self, tip_height: u32) -> Result<Vec<BlockInterval>, StorageError>;

    /// Cumulative address count per day, oldest first.
    async fn address_growth(&self) -> Result<Vec<AddressGrowth>, StorageError>;

    /// Holder and transfer counts of every QRC20 token.
    async fn token_statistics(&self) -> Result<Vec<TokenStatistics>, StorageError>;

    /// Holder and transfer counts of every QRC721 token.
    async fn qrc721_statistics(&self) -> Result<Vec<TokenStatistics>, StorageError>;

    /// Timestamp of the highest canonical block.
    ///
    /// Fails with [`StorageError::EntryNotFound`] while the ledger holds no block.
    async fn block_time(&self) -> Result<u64, StorageError>;

    /// Difficulty of the highest canonical block.
    async fn difficulty(&self) -> Result<f64, StorageError>;

    /// Network stake weight estimated from the difficulty and spacing of recent blocks.
    async fn stake_weight(&self) -> Result<f64, StorageError>;

    /// Number of non-contract addresses.
    async fn address_count(&self) -> Result<u64, StorageError>;

    /// The `count` newest confirmed transactions, skipping block rewards.
    async fn recent_transactions(&self, count: usize) -> Result<Vec<TransactionView>, StorageError>;

    /// The `count` newest transactions with pending ones first, and the total transaction count.
    async fn latest_transactions(&self, count: usize) -> Result<LatestTransactions, StorageError>;
}
