//! Interface of the ledger store that chainview reads confirmed chain facts from.
//!
//! The ledger itself is produced by an external indexer. This crate only defines how it is
//! queried ([`LedgerReader`], [`RichListStore`], [`StatisticsSource`]) and ships
//! [`MemoryLedger`], an in-memory implementation of every trait.

mod error;
pub use error::StorageError;

mod traits;
pub use traits::{
    BalanceReader, BlockReader, LedgerReader, RichListStore, StatisticsSource, TokenReader,
    TransactionReader,
};

mod memory;
pub use memory::{AddressRecord, LedgerState, MemoryLedger};
