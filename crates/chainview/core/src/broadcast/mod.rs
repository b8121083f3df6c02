//! Real-time fan-out of chain events to subscriber rooms.

mod hub;
pub use hub::{ConnectionId, Delivery, RoomHub};

mod fanout;
pub use fanout::BroadcastFanout;
