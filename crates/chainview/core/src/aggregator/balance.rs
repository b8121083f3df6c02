use crate::{
    aggregator::{AggregatorError, BalanceAggregator},
    metrics::Metrics,
};
use chainview_storage::{BalanceReader, BlockReader, RichListStore};
use chainview_types::{
    AddressId, BalanceChange, BalanceHistory, BalanceHistoryEntry, BlockRef, RichListPage,
    RichListRow, TotalBalanceChanges, TxId, UNCONFIRMED_HEIGHT,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::trace;

/// Pagination and filtering of [`BalanceAggregator::balance_history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryOptions {
    /// Entries to skip.
    pub offset: usize,
    /// Maximum number of entries returned.
    pub limit: usize,
    /// Newest first when set.
    pub reversed: bool,
    /// Skip transactions whose net amount is zero.
    pub non_zero: bool,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self { offset: 0, limit: 100, reversed: true, non_zero: false }
    }
}

/// Net change of the address set in one transaction.
#[derive(Debug, Clone, Copy)]
struct TransactionDelta {
    position: (u32, u32, u64),
    tx_id: TxId,
    amount: i64,
}

/// Splits confirmed rows into received and sent totals.
///
/// Rows are netted per transaction and address first, so the two sides of a transfer between
/// addresses of the same set both count.
fn split_totals(changes: &[BalanceChange]) -> TotalBalanceChanges {
    let mut netted: HashMap<(u64, AddressId), i64> = HashMap::new();
    for change in changes.iter().filter(|change| change.is_confirmed()) {
        *netted.entry((change.transaction_id, change.address_id)).or_default() += change.value;
    }
    netted.into_values().fold(TotalBalanceChanges::default(), |mut totals, value| {
        if value > 0 {
            totals.total_received += value;
        } else {
            totals.total_sent -= value;
        }
        totals
    })
}

/// Groups confirmed rows by transaction, in chain order.
fn transaction_deltas(changes: &[BalanceChange]) -> Vec<TransactionDelta> {
    let mut grouped: HashMap<u64, TransactionDelta> = HashMap::new();
    for change in changes.iter().filter(|change| change.is_confirmed()) {
        grouped
            .entry(change.transaction_id)
            .and_modify(|delta| {
                delta.amount += change.value;
                delta.position = delta.position.min(change.position());
            })
            .or_insert(TransactionDelta {
                position: change.position(),
                tx_id: change.tx_id,
                amount: change.value,
            });
    }
    let mut deltas: Vec<_> = grouped.into_values().collect();
    deltas.sort_by_key(|delta| delta.position);
    deltas
}

impl<L> BalanceAggregator<L>
where
    L: BalanceReader + BlockReader + RichListStore,
{
    /// Confirmed inflow and outflow of `ids`.
    pub async fn total_balance_changes(
        &self,
        ids: &[AddressId],
    ) -> Result<TotalBalanceChanges, AggregatorError> {
        match ids {
            [] => Ok(TotalBalanceChanges::default()),
            [id] => {
                let cached = self.balances.totals(*id);
                Metrics::record_cache_lookup(Metrics::CACHE_BALANCE, cached.is_some());
                if let Some(totals) = cached {
                    return Ok(totals);
                }
                let epoch = self.balances.epoch();
                let totals = split_totals(&self.ledger.confirmed_balance_changes(ids).await?);
                if !self.balances.insert_totals(*id, epoch, totals) {
                    trace!(target: "chainview::aggregator", address = id, "Totals outdated, not cached");
                }
                Ok(totals)
            }
            _ => Ok(split_totals(&self.ledger.confirmed_balance_changes(ids).await?)),
        }
    }

    /// Sum of the mempool rows of `ids`.
    pub async fn unconfirmed_balance(&self, ids: &[AddressId]) -> Result<i64, AggregatorError> {
        let single = match ids {
            [] => return Ok(0),
            [id] => Some(*id),
            _ => None,
        };
        if let Some(id) = single {
            let cached = self.balances.unconfirmed(id);
            Metrics::record_cache_lookup(Metrics::CACHE_BALANCE, cached.is_some());
            if let Some(value) = cached {
                return Ok(value);
            }
        }

        let epoch = self.balances.epoch();
        let value = self
            .ledger
            .unconfirmed_balance_changes(ids)
            .await?
            .iter()
            .map(|change| change.value)
            .sum();
        if let Some(id) = single {
            self.balances.insert_unconfirmed(id, epoch, value);
        }
        Ok(value)
    }

    /// Unspent coinstake outputs of `ids` still inside the maturity window of the current tip.
    pub async fn staking_balance(&self, ids: &[AddressId]) -> Result<i64, AggregatorError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let threshold = i64::from(self.tip.height()) - i64::from(self.maturity_window);
        Ok(self
            .ledger
            .unspent_outputs(ids)
            .await?
            .iter()
            .filter(|output| output.is_stake && output.block_height != UNCONFIRMED_HEIGHT)
            .filter(|output| i64::from(output.block_height) > threshold)
            .map(|output| output.value)
            .sum())
    }

    /// Unspent outputs of `ids` mined at or below `tip - maturity_window`.
    pub async fn mature_balance(&self, ids: &[AddressId]) -> Result<i64, AggregatorError> {
        let Some(last_mature) = self.tip.height().checked_sub(self.maturity_window) else {
            return Ok(0);
        };
        if ids.is_empty() || last_mature == 0 {
            return Ok(0);
        }
        Ok(self
            .ledger
            .unspent_outputs(ids)
            .await?
            .iter()
            .filter(|output| (1..=last_mature).contains(&output.block_height))
            .map(|output| output.value)
            .sum())
    }

    /// One-based position of the single address in `ids` in the rich list snapshot.
    ///
    /// `None` for multi-address sets and addresses absent from the snapshot.
    pub async fn ranking(&self, ids: &[AddressId]) -> Result<Option<u64>, AggregatorError> {
        match ids {
            [id] => Ok(self.ledger.rich_list_rank(*id).await?),
            _ => Ok(None),
        }
    }

    /// Number of distinct confirmed transactions touching `ids`.
    pub async fn transaction_count(&self, ids: &[AddressId]) -> Result<u64, AggregatorError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let changes = self.ledger.confirmed_balance_changes(ids).await?;
        let distinct: HashSet<u64> = changes.iter().map(|change| change.transaction_id).collect();
        Ok(distinct.len() as u64)
    }

    /// A page of the confirmed transactions touching `ids`, with the running balance after each.
    pub async fn balance_history(
        &self,
        ids: &[AddressId],
        options: HistoryOptions,
    ) -> Result<BalanceHistory, AggregatorError> {
        if ids.is_empty() {
            return Ok(BalanceHistory::default());
        }
        let changes = self.ledger.confirmed_balance_changes(ids).await?;

        let mut balance = 0;
        let mut entries: Vec<(TransactionDelta, i64)> = transaction_deltas(&changes)
            .into_iter()
            .map(|delta| {
                balance += delta.amount;
                (delta, balance)
            })
            .filter(|(delta, _)| !options.non_zero || delta.amount != 0)
            .collect();
        let total_count = entries.len() as u64;
        if options.reversed {
            entries.reverse();
        }
        let page: Vec<_> = entries.into_iter().skip(options.offset).take(options.limit).collect();

        let heights: Vec<u32> = page
            .iter()
            .map(|(delta, _)| delta.position.0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let headers: BTreeMap<u32, BlockRef> = self
            .ledger
            .headers(&heights)
            .await?
            .into_iter()
            .map(|header| {
                (header.height, BlockRef { hash: header.hash, height: header.height, timestamp: header.timestamp })
            })
            .collect();

        let transactions = page
            .into_iter()
            .map(|(delta, balance)| BalanceHistoryEntry {
                id: delta.tx_id,
                block: headers.get(&delta.position.0).copied(),
                amount: delta.amount,
                balance,
            })
            .collect();
        Ok(BalanceHistory { total_count, transactions })
    }

    /// A page of the current rich list snapshot, richest first.
    pub async fn rich_list(&self, offset: usize, limit: usize) -> Result<RichListPage, AggregatorError> {
        let (total_count, entries) = self.ledger.rich_list_page(offset, limit).await?;
        Ok(RichListPage {
            total_count,
            list: entries
                .into_iter()
                .map(|entry| RichListRow { address: entry.address, balance: entry.balance })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::BalanceCache, test_utils::block, tip::tip_channel};
    use alloy_primitives::B256;
    use chainview_storage::{AddressRecord, MemoryLedger};
    use chainview_types::UnspentOutput;
    use rstest::rstest;
    use std::{num::NonZeroUsize, sync::Arc};

    fn change(address_id: AddressId, transaction_id: u64, block_height: u32, value: i64) -> BalanceChange {
        BalanceChange {
            address_id,
            transaction_id,
            tx_id: B256::with_last_byte(transaction_id as u8),
            block_height,
            index_in_block: 1,
            value,
        }
    }

    fn aggregator(
        ledger: Arc<MemoryLedger>,
        tip_height: u32,
    ) -> (BalanceAggregator<MemoryLedger>, Arc<BalanceCache>) {
        let (writer, reader) = tip_channel();
        writer.publish(block(tip_height, 0).tip());
        // The writer only needs to outlive the publish; readers keep the last value.
        drop(writer);
        let balances = Arc::new(BalanceCache::new(NonZeroUsize::new(16).unwrap()));
        (BalanceAggregator::new(ledger, balances.clone(), reader, 2_000), balances)
    }

    fn ledger_with(changes: Vec<BalanceChange>) -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.update(|state| {
            for height in 0..=20 {
                state.insert_block(block(height, 0));
            }
            state.balance_changes = changes;
        });
        ledger
    }

    #[tokio::test]
    async fn test_single_address_totals() {
        let ledger = ledger_with(vec![change(1, 1, 10, 10), change(1, 2, 11, -3), change(1, 3, 12, 5)]);
        let (aggregator, balances) = aggregator(ledger, 12);

        let totals = aggregator.total_balance_changes(&[1]).await.unwrap();
        assert_eq!(totals, TotalBalanceChanges { total_received: 15, total_sent: 3 });
        assert_eq!(totals.balance(), 12);
        assert_eq!(balances.totals(1), Some(totals));
    }

    #[tokio::test]
    async fn test_transfer_inside_set_counts_both_sides() {
        let ledger = ledger_with(vec![change(1, 7, 10, 10), change(2, 7, 10, -10)]);
        let (aggregator, balances) = aggregator(ledger, 12);

        let totals = aggregator.total_balance_changes(&[1, 2]).await.unwrap();
        assert_eq!(totals, TotalBalanceChanges { total_received: 10, total_sent: 10 });
        // Multi-address sets are never cached.
        assert!(balances.is_empty());
    }

    #[tokio::test]
    async fn test_rows_of_one_address_net_within_a_transaction() {
        let ledger = ledger_with(vec![change(1, 7, 10, -100), change(1, 7, 10, 90)]);
        let (aggregator, _) = aggregator(ledger, 12);

        let totals = aggregator.total_balance_changes(&[1, 2]).await.unwrap();
        assert_eq!(totals, TotalBalanceChanges { total_received: 0, total_sent: 10 });
    }

    #[tokio::test]
    async fn test_unconfirmed_overlay_is_stable() {
        let ledger = ledger_with(vec![
            change(1, 1, 10, 50),
            change(1, 2, UNCONFIRMED_HEIGHT, -20),
            change(1, 3, UNCONFIRMED_HEIGHT, 5),
        ]);
        let (aggregator, balances) = aggregator(ledger.clone(), 12);

        let first = aggregator.unconfirmed_balance(&[1]).await.unwrap();
        balances.invalidate_unconfirmed(&[1]);
        let second = aggregator.unconfirmed_balance(&[1]).await.unwrap();
        assert_eq!(first, -15);
        assert_eq!(first, second);
        assert_eq!(aggregator.unconfirmed_balance(&[]).await.unwrap(), 0);
    }

    #[rstest]
    #[case::young_tip(1_000, 700, 0)]
    #[case::old_tip(5_000, 0, 1_400)]
    #[tokio::test]
    async fn test_maturity_window_follows_tip(
        #[case] tip_height: u32,
        #[case] staking: i64,
        #[case] mature: i64,
    ) {
        let ledger = ledger_with(Vec::new());
        ledger.update(|state| {
            state.unspent_outputs = vec![
                UnspentOutput { address_id: 1, block_height: 500, value: 400, is_stake: true },
                UnspentOutput { address_id: 1, block_height: 900, value: 300, is_stake: true },
                UnspentOutput { address_id: 1, block_height: 2_000, value: 700, is_stake: false },
                UnspentOutput { address_id: 1, block_height: UNCONFIRMED_HEIGHT, value: 9, is_stake: true },
            ];
        });
        let (aggregator, _) = aggregator(ledger, tip_height);
        assert_eq!(aggregator.staking_balance(&[1]).await.unwrap(), staking);
        assert_eq!(aggregator.mature_balance(&[1]).await.unwrap(), mature);
    }

    #[tokio::test]
    async fn test_ranking_is_single_address_only() {
        let ledger = ledger_with(Vec::new());
        ledger.update(|state| {
            for (id, value) in [(1, 300), (2, 100), (3, 300)] {
                state.addresses.insert(
                    id,
                    AddressRecord { address: format!("qaddr{id}"), create_height: 1, is_contract: false },
                );
                state.unspent_outputs.push(UnspentOutput { address_id: id, block_height: 2, value, is_stake: false });
            }
        });
        let entries = ledger.rich_list_candidates(20).await.unwrap();
        ledger.replace_rich_list(entries).await.unwrap();
        let (aggregator, _) = aggregator(ledger, 20);

        assert_eq!(aggregator.ranking(&[2]).await.unwrap(), Some(3));
        assert_eq!(aggregator.ranking(&[3]).await.unwrap(), Some(1));
        assert_eq!(aggregator.ranking(&[1, 2]).await.unwrap(), None);
        assert_eq!(aggregator.ranking(&[9]).await.unwrap(), None);

        let page = aggregator.rich_list(0, 2).await.unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.list.iter().map(|row| row.balance).collect::<Vec<_>>(), vec![300, 300]);
    }

    #[tokio::test]
    async fn test_balance_history_running_balance() {
        let ledger = ledger_with(vec![
            change(1, 1, 10, 10),
            change(1, 2, 11, -3),
            change(2, 2, 11, 3),
            change(1, 3, 12, 5),
        ]);
        let (aggregator, _) = aggregator(ledger, 12);

        let history = aggregator
            .balance_history(&[1, 2], HistoryOptions { non_zero: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(history.total_count, 2);
        let amounts: Vec<_> = history.transactions.iter().map(|tx| (tx.amount, tx.balance)).collect();
        assert_eq!(amounts, vec![(5, 15), (10, 10)]);
        assert_eq!(history.transactions[0].block.unwrap().height, 12);

        let ascending = aggregator
            .balance_history(&[1], HistoryOptions { reversed: false, offset: 1, limit: 1, non_zero: false })
            .await
            .unwrap();
        assert_eq!(ascending.total_count, 3);
        assert_eq!(ascending.transactions.len(), 1);
        assert_eq!((ascending.transactions[0].amount, ascending.transactions[0].balance), (-3, 7));
    }

    #[tokio::test]
    async fn test_transaction_count_is_distinct() {
        let ledger = ledger_with(vec![change(1, 1, 10, 10), change(2, 1, 10, -4), change(1, 2, 11, 1)]);
        let (aggregator, _) = aggregator(ledger, 12);
        assert_eq!(aggregator.transaction_count(&[1, 2]).await.unwrap(), 2);
    }
}
