//! Connection to the upstream node event source.

mod error;
pub use error::UpstreamError;

mod traits;
pub use traits::{EventSubscription, UpstreamClient};

mod jsonrpsee;
pub use jsonrpsee::ChainEventsApiClient;

mod client;
pub use client::WsUpstreamClient;

mod subscriber;
pub use subscriber::UpstreamSubscriber;
