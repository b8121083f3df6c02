use crate::{
    metrics::Metrics,
    sync::SyncCommand,
    upstream::{EventSubscription, UpstreamClient, UpstreamError},
};
use backon::{ExponentialBuilder, Retryable};
use chainview_types::Tip;
use derive_more::Constructor;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Retries of one connection round. Each round restarts the backoff from its minimum delay.
const CONNECT_RETRIES: usize = 8;

/// How a subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    /// Shutdown was requested, or the synchronizer is gone.
    Stopped,
    /// The subscription failed and must be re-established.
    Disconnected,
}

/// Feeds upstream events to the synchronizer and keeps the subscription alive.
///
/// After every (re)connect the current tip is fetched and sent as
/// [`SyncCommand::Resync`] ahead of any event, since events may have been missed while
/// disconnected.
#[derive(Debug, Constructor)]
pub struct UpstreamSubscriber<C> {
    client: Arc<C>,
    commands: mpsc::Sender<SyncCommand>,
    cancel: CancellationToken,
}

impl<C> UpstreamSubscriber<C>
where
    C: UpstreamClient + 'static,
{
    /// Runs until cancelled, reconnecting on transport failures.
    pub async fn run(self) {
        let mut connected_before = false;
        loop {
            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                connected = self.connect() => connected,
            };
            if connected_before {
                metrics::counter!(Metrics::UPSTREAM_RECONNECTS_TOTAL).increment(1);
            }
            connected_before = true;

            let (subscription, tip) = connected;
            if self.commands.send(SyncCommand::Resync(tip)).await.is_err() {
                Self::close(subscription).await;
                break;
            }
            if self.pump(subscription).await == PumpExit::Stopped {
                break;
            }
        }
        info!(target: "chainview::upstream", "Upstream subscriber stopped");
    }

    /// Subscribes and fetches the tip, retrying with exponential backoff until it succeeds.
    async fn connect(&self) -> (Box<dyn EventSubscription>, Tip) {
        loop {
            let backoff = ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(30))
                .with_max_times(CONNECT_RETRIES);
            let attempt = (|| async {
                let subscription = self.client.subscribe().await?;
                let tip = self.client.current_tip().await?;
                Ok::<_, UpstreamError>((subscription, tip))
            })
            .retry(backoff)
            .notify(|err, delay| {
                warn!(
                    target: "chainview::upstream",
                    %err,
                    retry_in = ?delay,
                    "Failed to connect to upstream node"
                );
            })
            .await;

            match attempt {
                Ok(connected) => {
                    info!(
                        target: "chainview::upstream",
                        height = connected.1.height,
                        "Upstream subscription established"
                    );
                    return connected;
                }
                Err(err) => {
                    error!(
                        target: "chainview::upstream",
                        %err,
                        retries = CONNECT_RETRIES,
                        "Upstream retries exhausted, starting over"
                    );
                }
            }
        }
    }

    /// Forwards events until the subscription ends or shutdown is requested.
    async fn pump(&self, mut subscription: Box<dyn EventSubscription>) -> PumpExit {
        let exit = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(target: "chainview::upstream", "Cancellation requested, unsubscribing");
                    break PumpExit::Stopped;
                }
                event = subscription.next_event() => match event {
                    Some(Ok(event)) => {
                        if self.commands.send(event.into()).await.is_err() {
                            warn!(target: "chainview::upstream", "Synchronizer is gone, unsubscribing");
                            break PumpExit::Stopped;
                        }
                    }
                    Some(Err(UpstreamError::Malformed(reason))) => {
                        metrics::counter!(Metrics::MALFORMED_EVENTS_TOTAL).increment(1);
                        warn!(target: "chainview::upstream", %reason, "Dropping malformed upstream event");
                    }
                    Some(Err(err)) => {
                        warn!(target: "chainview::upstream", %err, "Upstream subscription failed");
                        break PumpExit::Disconnected;
                    }
                    None => {
                        warn!(target: "chainview::upstream", "Upstream subscription closed by server");
                        break PumpExit::Disconnected;
                    }
                }
            }
        };

        if exit == PumpExit::Stopped {
            Self::close(subscription).await;
        }
        exit
    }

    async fn close(subscription: Box<dyn EventSubscription>) {
        if let Err(err) = subscription.unsubscribe().await {
            warn!(target: "chainview::upstream", %err, "Failed to unsubscribe gracefully");
        }
    }
}
