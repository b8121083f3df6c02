//! [`ChainEventsApi`] lists the upstream node endpoints chainview consumes.

use chainview_types::Tip;
use jsonrpsee::{
    core::{RpcResult, SubscriptionResult},
    proc_macros::rpc,
};

/// Chain event endpoints of the upstream node.
///
/// Events are delivered as raw JSON so a single undecodable payload does not end the stream.
#[rpc(client, namespace = "chain")]
pub trait ChainEventsApi {
    /// Subscribes to `tip`, `block`, `reorg` and `mempool-transaction` events.
    #[subscription(name = "subscribeEvents", item = serde_json::Value, unsubscribe = "unsubscribeEvents")]
    async fn subscribe_events(&self) -> SubscriptionResult;

    /// Returns the node's current tip.
    #[method(name = "getTip")]
    async fn get_tip(&self) -> RpcResult<Tip>;
}
