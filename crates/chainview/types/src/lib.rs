//! Core types shared across chainview components.
//!
//! This crate defines the data structures exchanged between the upstream node, the ledger
//! store, the derived-state caches and the real-time subscribers.

mod tip;
pub use tip::Tip;

mod block;
pub use block::{BlockKey, BlockView};

mod transaction;
pub use transaction::{
    EvmReceiptView, LatestTransactions, TransactionInput, TransactionOutput, TransactionView, TxId,
};

mod ledger;
pub use ledger::{
    AddressId, BalanceChange, HeaderRef, PendingEvmCall, Qrc721Holding, RichListEntry,
    TokenBalanceRow, TokenInfo, TouchedAddress, UNCONFIRMED_HEIGHT, UnspentOutput,
};

mod token;
pub use token::{TRANSFER_SELECTOR, TransferCall};

mod summary;
pub use summary::{
    AddressSummary, BalanceHistory, BalanceHistoryEntry, BlockRef, Qrc20Balance, Qrc721Balance,
    RichListPage, RichListRow, TotalBalanceChanges, UnconfirmedTokenDelta,
};

mod statistics;
pub use statistics::{
    AddressGrowth, BlockInterval, DailyTransactions, Statistics24h, TokenStatistics,
};

mod event;
pub use event::UpstreamEvent;

mod room;
pub use room::{Notification, Room, RoomParseError};

mod confirmed;
pub use confirmed::Confirmed;
