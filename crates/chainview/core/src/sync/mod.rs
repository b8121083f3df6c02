//! The tip synchronizer: single writer of the current tip.

mod command;
pub use command::{SyncCommand, SyncState};

mod synchronizer;
pub use synchronizer::TipSynchronizer;
