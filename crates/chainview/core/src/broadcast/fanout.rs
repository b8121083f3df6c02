use crate::{
    broadcast::RoomHub,
    bus::{ChainEvent, ChainEventHandler, HandlerError},
};
use async_trait::async_trait;
use chainview_types::{Notification, Room, TouchedAddress, TxId};
use derive_more::Constructor;
use std::sync::Arc;

/// Maps chain events to room notifications.
///
/// | event                | rooms                                                        |
/// |----------------------|--------------------------------------------------------------|
/// | tip advanced         | global                                                       |
/// | new block            | global, `transaction/<id>` per mined id, `address/<a>` per touched address |
/// | reorg                | global                                                       |
/// | mempool transaction  | `mempool`, `address/<a>` per touched address                 |
///
/// The `blockchain` and `transaction` rooms are fed by the statistics refresher instead.
#[derive(Debug, Clone, Constructor)]
pub struct BroadcastFanout {
    hub: Arc<RoomHub>,
}

impl BroadcastFanout {
    fn address_transactions<'a>(
        &self,
        addresses: impl IntoIterator<Item = &'a TouchedAddress>,
        id: TxId,
    ) {
        for touched in addresses {
            self.hub.publish(
                &Room::Address(touched.address.clone()),
                Notification::AddressTransaction { address: touched.address.clone(), id },
            );
        }
    }
}

#[async_trait]
impl ChainEventHandler for BroadcastFanout {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError> {
        match event {
            ChainEvent::TipAdvanced(tip) => {
                self.hub.publish(&Room::Global, Notification::Tip(**tip));
            }
            ChainEvent::NewBlock { block, touched } => {
                self.hub.publish(&Room::Global, Notification::Block(block.as_ref().clone()));
                for id in &block.transactions {
                    self.hub.publish(&Room::Transaction(*id), Notification::TransactionConfirm(*id));
                }
                for (id, addresses) in block.transactions.iter().zip(touched.iter()) {
                    self.address_transactions(addresses, *id);
                }
            }
            ChainEvent::Reorged { tip, .. } => {
                self.hub.publish(&Room::Global, Notification::Reorg(**tip));
            }
            ChainEvent::MempoolTransaction { id, transaction, touched } => {
                // Nothing to show until the indexer has materialized the transaction.
                let Some(transaction) = transaction else {
                    return Ok(());
                };
                self.hub.publish(
                    &Room::Mempool,
                    Notification::MempoolTransaction(Box::new(transaction.as_ref().clone())),
                );
                self.address_transactions(touched.iter(), *id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{block, confirmed_tx, touched};
    use alloy_primitives::B256;
    use chainview_types::UNCONFIRMED_HEIGHT;

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<Arc<Notification>>) -> Vec<Notification> {
        let mut seen = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            seen.push(notification.as_ref().clone());
        }
        seen
    }

    #[tokio::test]
    async fn test_new_block_reaches_transaction_and_address_rooms() {
        let hub = Arc::new(RoomHub::new(16));
        let fanout = BroadcastFanout::new(hub.clone());

        let (watcher, mut watcher_rx) = hub.connect();
        let (bystander, mut bystander_rx) = hub.connect();
        let first = B256::repeat_byte(1);
        let second = B256::repeat_byte(2);
        hub.subscribe(watcher, Room::Transaction(second));
        hub.subscribe(watcher, Room::Address(touched(7).address));
        hub.subscribe(bystander, Room::Mempool);

        let mut view = block(50, 0);
        view.transactions = vec![first, second];
        let event = ChainEvent::NewBlock {
            block: Arc::new(view.clone()),
            touched: Arc::new(vec![vec![touched(3)], vec![touched(7)]]),
        };
        fanout.handle(&event).await.unwrap();

        assert_eq!(
            drain(&mut watcher_rx),
            vec![
                Notification::Block(view.clone()),
                Notification::TransactionConfirm(second),
                Notification::AddressTransaction { address: touched(7).address, id: second },
            ]
        );
        assert_eq!(drain(&mut bystander_rx), vec![Notification::Block(view)]);
    }

    #[tokio::test]
    async fn test_reorg_goes_to_global_only() {
        let hub = Arc::new(RoomHub::new(16));
        let fanout = BroadcastFanout::new(hub.clone());
        let (id, mut rx) = hub.connect();
        hub.subscribe(id, Room::Mempool);

        let tip = block(97, 1).tip();
        let event = ChainEvent::Reorged { tip: Arc::new(tip), original_height: 100 };
        fanout.handle(&event).await.unwrap();
        assert_eq!(drain(&mut rx), vec![Notification::Reorg(tip)]);
    }

    #[tokio::test]
    async fn test_mempool_transaction_rooms() {
        let hub = Arc::new(RoomHub::new(16));
        let fanout = BroadcastFanout::new(hub.clone());
        let (id, mut rx) = hub.connect();
        hub.subscribe(id, Room::Mempool);
        hub.subscribe(id, Room::Address(touched(1).address));

        let mut pending = confirmed_tx(9, 0);
        pending.block_height = UNCONFIRMED_HEIGHT;
        let event = ChainEvent::MempoolTransaction {
            id: pending.id,
            transaction: Some(Arc::new(pending.clone())),
            touched: Arc::new(vec![touched(1), touched(2)]),
        };
        fanout.handle(&event).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                Notification::MempoolTransaction(Box::new(pending.clone())),
                Notification::AddressTransaction { address: touched(1).address, id: pending.id },
            ]
        );

        let unknown = ChainEvent::MempoolTransaction {
            id: pending.id,
            transaction: None,
            touched: Arc::new(vec![touched(1)]),
        };
        fanout.handle(&unknown).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }
}
