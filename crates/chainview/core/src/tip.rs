//! The process-wide current tip.
//!
//! The tip is published as an immutable [`Arc<Tip>`] through a [`watch`] channel. The
//! [`TipWriter`] is held by the synchronizer alone; every other component reads snapshots
//! through a [`TipReader`] and never observes a partially updated value.

use chainview_types::Tip;
use std::sync::Arc;
use tokio::sync::watch;

/// Creates a connected writer/reader pair with no tip published yet.
pub fn tip_channel() -> (TipWriter, TipReader) {
    let (tx, rx) = watch::channel(None);
    (TipWriter { tx }, TipReader { rx })
}

/// Single writer of the current tip.
#[derive(Debug)]
pub struct TipWriter {
    tx: watch::Sender<Option<Arc<Tip>>>,
}

impl TipWriter {
    /// Publishes `tip` as the current tip and returns the published snapshot.
    pub fn publish(&self, tip: Tip) -> Arc<Tip> {
        let tip = Arc::new(tip);
        self.tx.send_replace(Some(tip.clone()));
        tip
    }

    /// Returns the current tip.
    pub fn current(&self) -> Option<Arc<Tip>> {
        self.tx.borrow().clone()
    }

    /// Creates a new reader of this tip.
    pub fn reader(&self) -> TipReader {
        TipReader { rx: self.tx.subscribe() }
    }
}

/// Read handle to the current tip.
#[derive(Debug, Clone)]
pub struct TipReader {
    rx: watch::Receiver<Option<Arc<Tip>>>,
}

impl TipReader {
    /// Returns a snapshot of the current tip.
    pub fn current(&self) -> Option<Arc<Tip>> {
        self.rx.borrow().clone()
    }

    /// Height of the current tip, zero before the first tip is known.
    pub fn height(&self) -> u32 {
        self.rx.borrow().as_ref().map_or(0, |tip| tip.height)
    }

    /// Waits for the next tip change and returns the new snapshot.
    ///
    /// Returns `None` once the writer is dropped.
    pub async fn changed(&mut self) -> Option<Arc<Tip>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    #[tokio::test]
    async fn test_readers_see_published_snapshot() {
        let (writer, mut reader) = tip_channel();
        assert!(reader.current().is_none());
        assert_eq!(reader.height(), 0);

        let published = writer.publish(Tip::new(10, B256::repeat_byte(1), 100));
        let seen = reader.changed().await.unwrap();
        assert!(Arc::ptr_eq(&published, &seen));
        assert_eq!(writer.reader().height(), 10);
    }

    #[tokio::test]
    async fn test_changed_ends_when_writer_dropped() {
        let (writer, mut reader) = tip_channel();
        drop(writer);
        assert!(reader.changed().await.is_none());
    }
}
