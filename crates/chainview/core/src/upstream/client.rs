use crate::upstream::{ChainEventsApiClient, EventSubscription, UpstreamClient, UpstreamError};
use async_trait::async_trait;
use chainview_types::{Tip, UpstreamEvent};
use jsonrpsee::{
    core::client::Subscription,
    ws_client::{WsClient, WsClientBuilder},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// [`UpstreamClient`] speaking JSON-RPC over a WebSocket.
///
/// The connection is established lazily and re-established on the next call once it drops.
#[derive(Debug)]
pub struct WsUpstreamClient {
    url: String,
    client: Mutex<Option<Arc<WsClient>>>,
}

impl WsUpstreamClient {
    /// Creates a client for the node at `url`. No connection is made yet.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: Mutex::new(None) }
    }

    /// Returns the connected client, connecting first if needed.
    async fn connection(&self) -> Result<Arc<WsClient>, UpstreamError> {
        let mut client = self.client.lock().await;
        if let Some(existing) = client.as_ref().filter(|existing| existing.is_connected()) {
            return Ok(existing.clone());
        }

        info!(target: "chainview::upstream", url = %self.url, "Connecting to upstream node");
        let connected = Arc::new(WsClientBuilder::default().build(&self.url).await?);
        *client = Some(connected.clone());
        Ok(connected)
    }
}

#[async_trait]
impl UpstreamClient for WsUpstreamClient {
    async fn subscribe(&self) -> Result<Box<dyn EventSubscription>, UpstreamError> {
        let client = self.connection().await?;
        let subscription = ChainEventsApiClient::subscribe_events(client.as_ref()).await?;
        debug!(target: "chainview::upstream", "Subscribed to chain events");
        Ok(Box::new(WsEventSubscription { subscription, _client: client }))
    }

    async fn current_tip(&self) -> Result<Tip, UpstreamError> {
        let client = self.connection().await?;
        Ok(client.get_tip().await?)
    }
}

/// Event subscription over a [`WsClient`].
#[derive(Debug)]
struct WsEventSubscription {
    subscription: Subscription<serde_json::Value>,
    /// Keeps the connection alive for as long as the subscription is.
    _client: Arc<WsClient>,
}

#[async_trait]
impl EventSubscription for WsEventSubscription {
    async fn next_event(&mut self) -> Option<Result<UpstreamEvent, UpstreamError>> {
        let item = self.subscription.next().await?;
        Some(
            item.and_then(serde_json::from_value)
                .map_err(|err| UpstreamError::Malformed(err.to_string())),
        )
    }

    async fn unsubscribe(self: Box<Self>) -> Result<(), UpstreamError> {
        Ok(self.subscription.unsubscribe().await?)
    }
}
