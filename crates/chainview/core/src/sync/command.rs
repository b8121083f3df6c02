use chainview_types::{Tip, UpstreamEvent};

/// Input of the [`TipSynchronizer`](super::TipSynchronizer).
#[derive(Debug, Clone, PartialEq)]
pub enum SyncCommand {
    /// An event received from the upstream subscription.
    Event(UpstreamEvent),
    /// The upstream tip, fetched explicitly after a (re)connect.
    Resync(Tip),
}

impl From<UpstreamEvent> for SyncCommand {
    fn from(event: UpstreamEvent) -> Self {
        Self::Event(event)
    }
}

/// State of the [`TipSynchronizer`](super::TipSynchronizer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    /// Steady state.
    #[default]
    Synced,
    /// Retired blocks are being invalidated; the new tip is not published yet.
    Reorging {
        /// Tip height before the reorg.
        original_height: u32,
    },
}
