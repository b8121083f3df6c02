//! Balance and token aggregation over the ledger store.
//!
//! Every call reads the ledger afresh, except the confirmed totals and unconfirmed sums of
//! single addresses, which are kept in the [`BalanceCache`] until a block or mempool
//! transaction touches the address. Values depending on the tip (staking and mature balances)
//! are always computed against the tip snapshot taken at call time.

use crate::{cache::BalanceCache, tip::TipReader};
use alloy_primitives::Address;
use chainview_storage::StorageError;
use chainview_types::AddressId;
use std::sync::Arc;
use thiserror::Error;

mod balance;
pub use balance::HistoryOptions;

mod token;

mod summary;

/// Errors raised by the [`BalanceAggregator`].
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// The ledger store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The requested QRC20 contract is not a known token.
    #[error("unknown token {0}")]
    UnknownToken(Address),
}

/// The address set of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressQuery {
    /// Internal ids of every address in the set.
    pub ids: Vec<AddressId>,
    /// Ids of the pay-to-pubkey-hash addresses, the only ones that stake and mine.
    pub p2pkh_ids: Vec<AddressId>,
    /// EVM form of the addresses that can hold tokens.
    pub hex: Vec<Address>,
}

impl AddressQuery {
    /// A query for one pay-to-pubkey-hash address.
    pub fn p2pkh(id: AddressId, hex: Address) -> Self {
        Self { ids: vec![id], p2pkh_ids: vec![id], hex: vec![hex] }
    }
}

/// Computes confirmed totals, unconfirmed overlays and token balances of address sets.
#[derive(Debug)]
pub struct BalanceAggregator<L> {
    ledger: Arc<L>,
    balances: Arc<BalanceCache>,
    tip: TipReader,
    maturity_window: u32,
}

impl<L> BalanceAggregator<L> {
    /// Creates an aggregator reading `ledger`, caching in `balances`.
    ///
    /// `maturity_window` is the number of blocks a coinstake output stays immature.
    pub const fn new(
        ledger: Arc<L>,
        balances: Arc<BalanceCache>,
        tip: TipReader,
        maturity_window: u32,
    ) -> Self {
        Self { ledger, balances, tip, maturity_window }
    }
}
