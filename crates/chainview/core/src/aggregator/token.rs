use crate::aggregator::{AggregatorError, BalanceAggregator};
use alloy_primitives::{Address, U256};
use chainview_storage::TokenReader;
use chainview_types::{
    PendingEvmCall, Qrc20Balance, Qrc721Balance, TokenInfo, TransferCall, UnconfirmedTokenDelta,
};
use std::collections::{BTreeMap, BTreeSet};

/// Applies a pending call to the overlay of `holders`.
///
/// Returns `None` if the call is not a `transfer`, otherwise whether a holder takes part in it.
/// A transfer between two holders leaves the overlay unchanged.
fn apply_transfer(
    delta: &mut UnconfirmedTokenDelta,
    call: &PendingEvmCall,
    holders: &[Address],
) -> Option<bool> {
    let transfer = TransferCall::decode(&call.byte_code)?;
    let is_from = holders.contains(&call.sender);
    let is_to = holders.contains(&transfer.to);
    match (is_from, is_to) {
        (true, false) => delta.sent = delta.sent.saturating_add(transfer.value),
        (false, true) => delta.received = delta.received.saturating_add(transfer.value),
        _ => {}
    }
    Some(is_from || is_to)
}

impl<L> BalanceAggregator<L>
where
    L: TokenReader,
{
    /// QRC20 balances of `holders` in every token, with the pending transfer overlay.
    ///
    /// A token the holders only touch through pending transfers is reported with a zero
    /// confirmed balance and `is_unconfirmed` set.
    pub async fn qrc20_balances(&self, holders: &[Address]) -> Result<Vec<Qrc20Balance>, AggregatorError> {
        if holders.is_empty() {
            return Ok(Vec::new());
        }
        let (rows, pending) = tokio::try_join!(
            self.ledger.token_balances(holders, None),
            self.ledger.pending_evm_calls(None),
        )?;

        let mut balances: BTreeMap<Address, Qrc20Balance> = BTreeMap::new();
        for row in rows {
            let entry = balances.entry(row.token.contract).or_insert_with(|| Qrc20Balance {
                token: row.token.clone(),
                balance: U256::ZERO,
                unconfirmed: UnconfirmedTokenDelta::default(),
                is_unconfirmed: false,
            });
            entry.balance = entry.balance.saturating_add(row.balance);
        }

        let mut untouched = BTreeSet::new();
        for call in &pending {
            let contract = call.token.contract;
            let entry = balances.entry(contract).or_insert_with(|| {
                untouched.insert(contract);
                Qrc20Balance {
                    token: call.token.clone(),
                    balance: U256::ZERO,
                    unconfirmed: UnconfirmedTokenDelta::default(),
                    is_unconfirmed: true,
                }
            });
            if apply_transfer(&mut entry.unconfirmed, call, holders) == Some(true) {
                untouched.remove(&contract);
            }
        }
        balances.retain(|contract, _| !untouched.contains(contract));
        Ok(balances.into_values().collect())
    }

    /// QRC20 balance of `holders` in the token deployed at `contract`, with its pending overlay.
    pub async fn qrc20_balance(
        &self,
        holders: &[Address],
        contract: Address,
    ) -> Result<Qrc20Balance, AggregatorError> {
        let token: TokenInfo =
            self.ledger.token(contract).await?.ok_or(AggregatorError::UnknownToken(contract))?;
        let mut balance = Qrc20Balance {
            token,
            balance: U256::ZERO,
            unconfirmed: UnconfirmedTokenDelta::default(),
            is_unconfirmed: false,
        };
        if holders.is_empty() {
            return Ok(balance);
        }

        let (rows, pending) = tokio::try_join!(
            self.ledger.token_balances(holders, Some(contract)),
            self.ledger.pending_evm_calls(Some(contract)),
        )?;
        balance.balance =
            rows.iter().fold(U256::ZERO, |sum, row| sum.saturating_add(row.balance));
        for call in &pending {
            apply_transfer(&mut balance.unconfirmed, call, holders);
        }
        Ok(balance)
    }

    /// Number of QRC721 tokens `holders` own, per contract.
    pub async fn qrc721_balances(&self, holders: &[Address]) -> Result<Vec<Qrc721Balance>, AggregatorError> {
        if holders.is_empty() {
            return Ok(Vec::new());
        }
        let mut balances: BTreeMap<Address, Qrc721Balance> = BTreeMap::new();
        for holding in self.ledger.qrc721_holdings(holders).await? {
            balances
                .entry(holding.token.contract)
                .or_insert_with(|| Qrc721Balance { token: holding.token.clone(), count: 0 })
                .count += holding.count;
        }
        Ok(balances.into_values().filter(|balance| balance.count > 0).collect())
    }
}
