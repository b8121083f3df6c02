use crate::upstream::UpstreamError;
use async_trait::async_trait;
use chainview_types::{Tip, UpstreamEvent};
use std::fmt::Debug;

/// A live subscription to upstream chain events.
#[async_trait]
pub trait EventSubscription: Debug + Send {
    /// Waits for the next event.
    ///
    /// Returns `None` once the subscription ended. An
    /// [`UpstreamError::Malformed`] item only affects that one event.
    async fn next_event(&mut self) -> Option<Result<UpstreamEvent, UpstreamError>>;

    /// Unsubscribes and closes the subscription.
    async fn unsubscribe(self: Box<Self>) -> Result<(), UpstreamError>;
}

/// Client of the upstream node.
#[async_trait]
pub trait UpstreamClient: Debug + Send + Sync {
    /// Opens a new event subscription, reconnecting if needed.
    async fn subscribe(&self) -> Result<Box<dyn EventSubscription>, UpstreamError>;

    /// Fetches the node's current tip.
    async fn current_tip(&self) -> Result<Tip, UpstreamError>;
}
