use crate::metrics::Metrics;
use chainview_types::{Notification, Room};
use parking_lot::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

/// Identifier of a real-time connection.
pub type ConnectionId = u64;

/// Result of publishing one notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Connections the notification was queued to.
    pub delivered: usize,
    /// Connections whose queue was full.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct HubState {
    next_id: ConnectionId,
    connections: HashMap<ConnectionId, mpsc::Sender<Arc<Notification>>>,
    rooms: HashMap<Room, HashSet<ConnectionId>>,
}

impl HubState {
    fn remove_connection(&mut self, id: ConnectionId) -> bool {
        if self.connections.remove(&id).is_none() {
            return false;
        }
        self.rooms.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
        true
    }
}

/// Room membership of connected real-time subscribers.
///
/// Every connection is implicitly a member of [`Room::Global`]. Membership is in-memory only.
/// Delivery never waits: each connection owns a bounded queue, and a notification that does
/// not fit is dropped for that connection.
#[derive(Debug)]
pub struct RoomHub {
    state: RwLock<HubState>,
    buffer: usize,
}

impl RoomHub {
    /// Creates a hub whose connections buffer up to `buffer` notifications each.
    pub fn new(buffer: usize) -> Self {
        Self { state: RwLock::new(HubState::default()), buffer: buffer.max(1) }
    }

    /// Registers a connection and returns its id with the receiving end of its queue.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<Arc<Notification>>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut state = self.state.write();
        let id = state.next_id;
        state.next_id += 1;
        state.connections.insert(id, tx);
        debug!(target: "chainview::broadcast", connection = id, "Connection registered");
        (id, rx)
    }

    /// Adds a connection to `room`. Returns `false` if the connection is unknown.
    pub fn subscribe(&self, id: ConnectionId, room: Room) -> bool {
        let mut state = self.state.write();
        if !state.connections.contains_key(&id) {
            return false;
        }
        if room != Room::Global {
            trace!(target: "chainview::broadcast", connection = id, %room, "Joined room");
            state.rooms.entry(room).or_default().insert(id);
        }
        true
    }

    /// Removes a connection from `room`. Returns `true` if it was a member.
    pub fn unsubscribe(&self, id: ConnectionId, room: &Room) -> bool {
        let mut state = self.state.write();
        let Some(members) = state.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&id);
        if members.is_empty() {
            state.rooms.remove(room);
        }
        removed
    }

    /// Unregisters a connection and leaves every room.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = self.state.write().remove_connection(id);
        if removed {
            debug!(target: "chainview::broadcast", connection = id, "Connection unregistered");
        }
        removed
    }

    /// Number of members of `room`.
    pub fn room_size(&self, room: &Room) -> usize {
        let state = self.state.read();
        match room {
            Room::Global => state.connections.len(),
            room => state.rooms.get(room).map_or(0, HashSet::len),
        }
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.state.read().connections.len()
    }

    /// Queues `notification` to every member of `room`.
    ///
    /// Connections whose receiver is gone are unregistered.
    pub fn publish(&self, room: &Room, notification: Notification) -> Delivery {
        let notification = Arc::new(notification);
        let mut delivery = Delivery::default();
        let mut closed = Vec::new();

        {
            let state = self.state.read();
            let mut send = |id: ConnectionId, tx: &mpsc::Sender<Arc<Notification>>| {
                match tx.try_send(notification.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(TrySendError::Full(_)) => delivery.dropped += 1,
                    Err(TrySendError::Closed(_)) => closed.push(id),
                }
            };
            match room {
                Room::Global => {
                    for (id, tx) in &state.connections {
                        send(*id, tx);
                    }
                }
                room => {
                    for id in state.rooms.get(room).into_iter().flatten() {
                        if let Some(tx) = state.connections.get(id) {
                            send(*id, tx);
                        }
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut state = self.state.write();
            for id in closed {
                state.remove_connection(id);
            }
        }

        metrics::counter!(Metrics::BROADCAST_DELIVERED_TOTAL).increment(delivery.delivered as u64);
        if delivery.dropped > 0 {
            metrics::counter!(Metrics::BROADCAST_DROPPED_TOTAL).increment(delivery.dropped as u64);
            debug!(
                target: "chainview::broadcast",
                %room,
                dropped = delivery.dropped,
                "Subscriber queues full, notification dropped"
            );
        }
        delivery
    }
}
