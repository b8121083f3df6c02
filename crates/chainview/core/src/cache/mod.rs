//! Bounded in-memory caches of derived chain state.
//!
//! Every cache stores only values that do not depend on the current tip. The
//! [`InvalidationCoordinator`](crate::InvalidationCoordinator) is the only component that
//! removes entries in response to chain events; readers evict on validation failure only.

mod block;
pub use block::BlockCache;

mod transaction;
pub use transaction::TransactionCache;

mod balance;
pub use balance::BalanceCache;

mod reader;
pub use reader::ChainReader;
