//! In-memory ledger store.
//!
//! [`MemoryLedger`] implements every storage trait over plain collections. It backs the
//! development binary and the service level tests.

use crate::{
    BalanceReader, BlockReader, RichListStore, StatisticsSource, StorageError, TokenReader,
    TransactionReader,
};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chainview_types::{
    AddressGrowth, AddressId, BalanceChange, BlockInterval, BlockKey, BlockView, DailyTransactions,
    HeaderRef, LatestTransactions, PendingEvmCall, Qrc721Holding, RichListEntry, Statistics24h,
    TokenBalanceRow, TokenInfo, TokenStatistics, TouchedAddress, TransactionView, TxId,
    UNCONFIRMED_HEIGHT, UnspentOutput,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};
use tracing::debug;

const SECONDS_PER_DAY: u64 = 86_400;

/// Blocks behind the tip that the stake weight estimate spans.
const STAKE_WEIGHT_WINDOW: u32 = 500;

/// An address known to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    /// Address string.
    pub address: String,
    /// Height of the block the address first appeared in.
    pub create_height: u32,
    /// Whether the address is a contract.
    pub is_contract: bool,
}

/// Mutable contents of a [`MemoryLedger`].
#[derive(Debug, Default)]
pub struct LedgerState {
    /// Canonical blocks by height.
    pub blocks: BTreeMap<u32, BlockView>,
    /// Confirmed and pending transactions.
    pub transactions: HashMap<TxId, TransactionView>,
    /// Known addresses.
    pub addresses: BTreeMap<AddressId, AddressRecord>,
    /// Balance changes, confirmed and pending.
    pub balance_changes: Vec<BalanceChange>,
    /// Unspent outputs.
    pub unspent_outputs: Vec<UnspentOutput>,
    /// QRC20 tokens by contract.
    pub tokens: BTreeMap<Address, TokenInfo>,
    /// Confirmed QRC20 balances.
    pub token_balances: Vec<TokenBalanceRow>,
    /// Number of `Transfer` events emitted per QRC20 or QRC721 contract.
    pub token_transfers: HashMap<Address, u64>,
    /// Pending QRC20 calls.
    pub pending_calls: Vec<PendingEvmCall>,
    /// QRC721 tokens by contract.
    pub qrc721_tokens: BTreeMap<Address, TokenInfo>,
    /// QRC721 holdings.
    pub qrc721_holdings: Vec<Qrc721Holding>,
}

impl LedgerState {
    /// Inserts a canonical block, replacing any block at the same height.
    pub fn insert_block(&mut self, block: BlockView) {
        self.blocks.insert(block.height, block);
    }

    /// Drops every block above `height` together with its balance changes.
    ///
    /// Transactions of retired blocks return to the mempool.
    pub fn retire_above(&mut self, height: u32) {
        let retired = self.blocks.split_off(&(height + 1));
        for block in retired.values() {
            for id in &block.transactions {
                if let Some(tx) = self.transactions.get_mut(id) {
                    tx.block_height = UNCONFIRMED_HEIGHT;
                    tx.block_hash = None;
                    tx.timestamp = None;
                }
            }
        }
        self.balance_changes
            .retain(|change| change.block_height <= height || change.block_height == UNCONFIRMED_HEIGHT);
        self.unspent_outputs.retain(|output| output.block_height <= height);
    }

    fn address_string(&self, id: AddressId) -> Option<&str> {
        self.addresses.get(&id).map(|record| record.address.as_str())
    }

    fn touched(&self, id: AddressId) -> Option<TouchedAddress> {
        self.address_string(id)
            .map(|address| TouchedAddress { address_id: id, address: address.to_string() })
    }

    fn transaction_volume(&self, block: &BlockView) -> i64 {
        block
            .transactions
            .iter()
            .filter_map(|id| self.transactions.get(id))
            .flat_map(|tx| tx.outputs.iter())
            .map(|output| output.value)
            .sum()
    }

    fn tip_block(&self) -> Result<&BlockView, StorageError> {
        self.blocks
            .last_key_value()
            .map(|(_, block)| block)
            .ok_or_else(|| StorageError::EntryNotFound("canonical block".to_string()))
    }

    fn contract_transactions(&self, block: &BlockView) -> u64 {
        block
            .transactions
            .iter()
            .filter_map(|id| self.transactions.get(id))
            .filter(|tx| !tx.receipts.is_empty())
            .count() as u64
    }
}

/// Ledger store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    rich_list: RwLock<Arc<Vec<RichListEntry>>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `f` to the ledger contents under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut LedgerState) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Returns the current rich list snapshot.
    pub fn rich_list(&self) -> Arc<Vec<RichListEntry>> {
        self.rich_list.read().clone()
    }
}

#[async_trait]
impl BlockReader for MemoryLedger {
    async fn block(&self, key: BlockKey) -> Result<Option<BlockView>, StorageError> {
        let state = self.state.read();
        let block = match key {
            BlockKey::Height(height) => state.blocks.get(&height),
            BlockKey::Hash(hash) => state.blocks.values().find(|block| block.hash == hash),
        };
        Ok(block.map(|block| {
            let mut block = block.clone();
            block.next_hash = state.blocks.get(&(block.height + 1)).map(|next| next.hash);
            block
        }))
    }

    async fn block_hash(&self, height: u32) -> Result<Option<B256>, StorageError> {
        Ok(self.state.read().blocks.get(&height).map(|block| block.hash))
    }

    async fn headers(&self, heights: &[u32]) -> Result<Vec<HeaderRef>, StorageError> {
        let state = self.state.read();
        Ok(heights
            .iter()
            .filter_map(|height| state.blocks.get(height))
            .map(|block| HeaderRef {
                height: block.height,
                hash: block.hash,
                timestamp: block.timestamp,
            })
            .collect())
    }

    async fn block_address_transactions(
        &self,
        height: u32,
    ) -> Result<Vec<Vec<TouchedAddress>>, StorageError> {
        let state = self.state.read();
        let mut by_index: BTreeMap<u32, BTreeSet<TouchedAddress>> = BTreeMap::new();
        for change in state.balance_changes.iter().filter(|change| change.block_height == height) {
            if let Some(touched) = state.touched(change.address_id) {
                by_index.entry(change.index_in_block).or_default().insert(touched);
            }
        }
        let len = by_index.keys().next_back().map_or(0, |last| *last as usize + 1);
        let mut result = vec![Vec::new(); len];
        for (index, addresses) in by_index {
            result[index as usize] = addresses.into_iter().collect();
        }
        Ok(result)
    }

    async fn blocks_mined(&self, addresses: &[AddressId]) -> Result<u64, StorageError> {
        let state = self.state.read();
        let miners: Vec<&str> =
            addresses.iter().filter_map(|id| state.address_string(*id)).collect();
        Ok(state
            .blocks
            .range(1..)
            .filter(|(_, block)| miners.contains(&block.miner.as_str()))
            .count() as u64)
    }
}

#[async_trait]
impl TransactionReader for MemoryLedger {
    async fn transaction(&self, id: TxId) -> Result<Option<TransactionView>, StorageError> {
        Ok(self.state.read().transactions.get(&id).cloned())
    }

    async fn mempool_transaction_addresses(
        &self,
        id: TxId,
    ) -> Result<Vec<TouchedAddress>, StorageError> {
        let state = self.state.read();
        let addresses: BTreeSet<TouchedAddress> = state
            .balance_changes
            .iter()
            .filter(|change| change.tx_id == id && change.block_height == UNCONFIRMED_HEIGHT)
            .filter_map(|change| state.touched(change.address_id))
            .collect();
        Ok(addresses.into_iter().collect())
    }
}

#[async_trait]
impl BalanceReader for MemoryLedger {
    async fn confirmed_balance_changes(
        &self,
        addresses: &[AddressId],
    ) -> Result<Vec<BalanceChange>, StorageError> {
        let mut changes: Vec<BalanceChange> = self
            .state
            .read()
            .balance_changes
            .iter()
            .filter(|change| change.is_confirmed() && addresses.contains(&change.address_id))
            .copied()
            .collect();
        changes.sort_by_key(BalanceChange::position);
        Ok(changes)
    }

    async fn unconfirmed_balance_changes(
        &self,
        addresses: &[AddressId],
    ) -> Result<Vec<BalanceChange>, StorageError> {
        Ok(self
            .state
            .read()
            .balance_changes
            .iter()
            .filter(|change| {
                change.block_height == UNCONFIRMED_HEIGHT && addresses.contains(&change.address_id)
            })
            .copied()
            .collect())
    }

    async fn unspent_outputs(
        &self,
        addresses: &[AddressId],
    ) -> Result<Vec<UnspentOutput>, StorageError> {
        Ok(self
            .state
            .read()
            .unspent_outputs
            .iter()
            .filter(|output| addresses.contains(&output.address_id))
            .copied()
            .collect())
    }
}

#[async_trait]
impl TokenReader for MemoryLedger {
    async fn token(&self, contract: Address) -> Result<Option<TokenInfo>, StorageError> {
        Ok(self.state.read().tokens.get(&contract).cloned())
    }

    async fn token_balances(
        &self,
        holders: &[Address],
        token: Option<Address>,
    ) -> Result<Vec<TokenBalanceRow>, StorageError> {
        Ok(self
            .state
            .read()
            .token_balances
            .iter()
            .filter(|row| holders.contains(&row.holder))
            .filter(|row| token.is_none_or(|contract| row.token.contract == contract))
            .cloned()
            .collect())
    }

    async fn pending_evm_calls(
        &self,
        token: Option<Address>,
    ) -> Result<Vec<PendingEvmCall>, StorageError> {
        Ok(self
            .state
            .read()
            .pending_calls
            .iter()
            .filter(|call| token.is_none_or(|contract| call.token.contract == contract))
            .cloned()
            .collect())
    }

    async fn qrc721_holdings(&self, holders: &[Address]) -> Result<Vec<Qrc721Holding>, StorageError> {
        Ok(self
            .state
            .read()
            .qrc721_holdings
            .iter()
            .filter(|holding| holders.contains(&holding.holder))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RichListStore for MemoryLedger {
    async fn rich_list_candidates(&self, height: u32) -> Result<Vec<RichListEntry>, StorageError> {
        let state = self.state.read();
        let mut balances: BTreeMap<AddressId, i64> = BTreeMap::new();
        for output in state
            .unspent_outputs
            .iter()
            .filter(|output| output.value > 0 && (1..=height).contains(&output.block_height))
        {
            *balances.entry(output.address_id).or_default() += output.value;
        }
        Ok(balances
            .into_iter()
            .filter_map(|(address_id, balance)| {
                let record = state.addresses.get(&address_id)?;
                (!record.is_contract).then(|| RichListEntry {
                    address_id,
                    address: record.address.clone(),
                    balance,
                })
            })
            .collect())
    }

    async fn replace_rich_list(
        &self,
        mut entries: Vec<RichListEntry>,
    ) -> Result<(), StorageError> {
        entries.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.address_id.cmp(&b.address_id)));
        debug!(target: "chainview::storage", rows = entries.len(), "Replacing rich list snapshot");
        *self.rich_list.write() = Arc::new(entries);
        Ok(())
    }

    async fn rich_list_rank(&self, address: AddressId) -> Result<Option<u64>, StorageError> {
        let snapshot = self.rich_list();
        let Some(entry) = snapshot.iter().find(|entry| entry.address_id == address) else {
            return Ok(None);
        };
        let richer = snapshot.iter().filter(|other| other.balance > entry.balance).count() as u64;
        Ok(Some(richer + 1))
    }

    async fn rich_list_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(u64, Vec<RichListEntry>), StorageError> {
        let snapshot = self.rich_list();
        let page = snapshot.iter().skip(offset).take(limit).cloned().collect();
        Ok((snapshot.len() as u64, page))
    }
}

#[async_trait]
impl StatisticsSource for MemoryLedger {
    async fn statistics_24h(&self, now: u64) -> Result<Statistics24h, StorageError> {
        let state = self.state.read();
        let since = now.saturating_sub(SECONDS_PER_DAY);
        let window: Vec<&BlockView> = state
            .blocks
            .values()
            .filter(|block| block.timestamp > since && block.timestamp <= now)
            .collect();
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return Ok(Statistics24h::default());
        };
        let from = first.height.max(1);
        let to = last.height;

        let transaction_count =
            window.iter().map(|block| block.transactions.len() as u64).sum::<u64>();
        let transaction_volume = window.iter().map(|block| state.transaction_volume(block)).sum();
        let average_block_time = match state.blocks.get(&(from - 1)) {
            Some(before) if to >= from => {
                (last.timestamp.saturating_sub(before.timestamp)) as f64 /
                    f64::from(to - from + 1)
            }
            _ => 0.0,
        };
        Ok(Statistics24h { transaction_count, transaction_volume, average_block_time })
    }

    async fn daily_transactions(&self) -> Result<Vec<DailyTransactions>, StorageError> {
        let state = self.state.read();
        let mut days: BTreeMap<u64, DailyTransactions> = BTreeMap::new();
        for block in state.blocks.values() {
            let day = block.timestamp / SECONDS_PER_DAY;
            let entry = days.entry(day).or_insert(DailyTransactions {
                timestamp: day * SECONDS_PER_DAY,
                transactions_count: 0,
                contract_transactions_count: 0,
                transaction_volume: 0,
            });
            entry.transactions_count += block.transactions.len() as u64;
            entry.contract_transactions_count += state.contract_transactions(block);
            entry.transaction_volume += state.transaction_volume(block);
        }
        Ok(days.into_values().collect())
    }

    async fn block_intervals(&self, tip_height: u32) -> Result<Vec<BlockInterval>, StorageError> {
        let state = self.state.read();
        let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
        for interval in state.blocks.range(2..).filter_map(|(_, block)| block.interval) {
            *counts.entry(interval).or_default() += 1;
        }
        let total = tip_height.saturating_sub(1);
        Ok(counts
            .into_iter()
            .map(|(interval, count)| BlockInterval {
                interval,
                count,
                percentage: if total == 0 { 0.0 } else { count as f64 / f64::from(total) },
            })
            .collect())
    }

    async fn address_growth(&self) -> Result<Vec<AddressGrowth>, StorageError> {
        let state = self.state.read();
        let mut days: BTreeMap<u64, u64> = BTreeMap::new();
        for record in state.addresses.values().filter(|record| !record.is_contract) {
            if let Some(block) = state.blocks.get(&record.create_height) {
                *days.entry(block.timestamp / SECONDS_PER_DAY).or_default() += 1;
            }
        }
        let mut sum = 0;
        Ok(days
            .into_iter()
            .map(|(day, count)| {
                sum += count;
                AddressGrowth { timestamp: day * SECONDS_PER_DAY, count: sum }
            })
            .collect())
    }

    async fn token_statistics(&self) -> Result<Vec<TokenStatistics>, StorageError> {
        let state = self.state.read();
        Ok(state
            .tokens
            .keys()
            .map(|contract| TokenStatistics {
                contract: *contract,
                holders: state
                    .token_balances
                    .iter()
                    .filter(|row| row.token.contract == *contract && row.balance != U256::ZERO)
                    .count() as u64,
                transactions: state.token_transfers.get(contract).copied().unwrap_or_default(),
            })
            .collect())
    }

    async fn qrc721_statistics(&self) -> Result<Vec<TokenStatistics>, StorageError> {
        let state = self.state.read();
        Ok(state
            .qrc721_tokens
            .keys()
            .map(|contract| TokenStatistics {
                contract: *contract,
                holders: state
                    .qrc721_holdings
                    .iter()
                    .filter(|holding| holding.token.contract == *contract && holding.count > 0)
                    .count() as u64,
                transactions: state.token_transfers.get(contract).copied().unwrap_or_default(),
            })
            .collect())
    }

    async fn block_time(&self) -> Result<u64, StorageError> {
        Ok(self.state.read().tip_block()?.timestamp)
    }

    async fn difficulty(&self) -> Result<f64, StorageError> {
        Ok(self.state.read().tip_block()?.difficulty)
    }

    async fn stake_weight(&self) -> Result<f64, StorageError> {
        let state = self.state.read();
        let tip = state.tip_block()?.height;
        let window: Vec<&BlockView> = state
            .blocks
            .range(tip.saturating_sub(STAKE_WEIGHT_WINDOW)..)
            .map(|(_, block)| block)
            .collect();
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return Ok(0.0);
        };
        let span = last.timestamp.saturating_sub(first.timestamp);
        if span == 0 {
            return Ok(0.0);
        }
        let difficulty: f64 = window.iter().skip(1).map(|block| block.difficulty).sum();
        Ok(difficulty * 2f64.powi(32) * 16.0 / span as f64)
    }

    async fn address_count(&self) -> Result<u64, StorageError> {
        let state = self.state.read();
        Ok(state.addresses.values().filter(|record| !record.is_contract).count() as u64)
    }

    async fn recent_transactions(
        &self,
        count: usize,
    ) -> Result<Vec<TransactionView>, StorageError> {
        let state = self.state.read();
        Ok(state
            .blocks
            .values()
            .rev()
            .flat_map(|block| {
                // Coinbase, plus the coinstake of proof-of-stake blocks.
                let rewards = if block.proof_of_stake { 2 } else { 1 };
                block.transactions.iter().skip(rewards).rev()
            })
            .filter_map(|id| state.transactions.get(id))
            .take(count)
            .cloned()
            .collect())
    }

    async fn latest_transactions(&self, count: usize) -> Result<LatestTransactions, StorageError> {
        let state = self.state.read();
        let mut pending: Vec<&TransactionView> =
            state.transactions.values().filter(|tx| !tx.is_confirmed()).collect();
        pending.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        let confirmed = state
            .blocks
            .values()
            .rev()
            .flat_map(|block| block.transactions.iter().rev())
            .filter_map(|id| state.transactions.get(id));

        let confirmed_count =
            state.blocks.values().map(|block| block.transactions.len() as u64).sum::<u64>();
        let total_count = confirmed_count + pending.len() as u64;
        let transactions = pending.into_iter().chain(confirmed).take(count).cloned().collect();
        Ok(LatestTransactions { total_count, transactions })
    }
}
