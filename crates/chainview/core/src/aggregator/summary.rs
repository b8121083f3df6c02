use crate::aggregator::{AddressQuery, AggregatorError, BalanceAggregator};
use chainview_storage::{LedgerReader, RichListStore};
use chainview_types::AddressSummary;
use tracing::debug;

impl<L> BalanceAggregator<L>
where
    L: LedgerReader + RichListStore,
{
    /// Everything shown for an address set, computed concurrently.
    pub async fn address_summary(&self, query: &AddressQuery) -> Result<AddressSummary, AggregatorError> {
        let (
            totals,
            unconfirmed,
            staking,
            mature,
            qrc20_balances,
            qrc721_balances,
            ranking,
            blocks_mined,
            transaction_count,
        ) = tokio::try_join!(
            self.total_balance_changes(&query.ids),
            self.unconfirmed_balance(&query.ids),
            self.staking_balance(&query.ids),
            self.mature_balance(&query.p2pkh_ids),
            self.qrc20_balances(&query.hex),
            self.qrc721_balances(&query.hex),
            self.ranking(&query.ids),
            self.blocks_mined(query),
            self.transaction_count(&query.ids),
        )?;
        debug!(
            target: "chainview::aggregator",
            addresses = query.ids.len(),
            balance = totals.balance(),
            "Address summary computed"
        );

        Ok(AddressSummary {
            balance: totals.balance(),
            total_received: totals.total_received,
            total_sent: totals.total_sent,
            unconfirmed,
            staking,
            mature,
            qrc20_balances,
            qrc721_balances,
            ranking,
            transaction_count,
            blocks_mined,
        })
    }

    async fn blocks_mined(&self, query: &AddressQuery) -> Result<u64, AggregatorError> {
        if query.p2pkh_ids.is_empty() {
            return Ok(0);
        }
        Ok(self.ledger.blocks_mined(&query.p2pkh_ids).await?)
    }
}
