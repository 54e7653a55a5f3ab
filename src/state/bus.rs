//! Per-room publish/subscribe topics.

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::ws::RoomMessage;

/// Broadcast hub holding one topic per room id.
///
/// Topics are created lazily on first subscription. Delivery is ordered per sender and reaches
/// every subscriber, the publisher's own subscription included.
pub struct RoomHub {
    capacity: usize,
    topics: DashMap<Uuid, broadcast::Sender<RoomMessage>>,
}

impl RoomHub {
    /// Construct a hub whose topics buffer up to `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: DashMap::new(),
        }
    }

    /// Register a new subscriber that will receive subsequent messages of `room`.
    pub fn subscribe(&self, room: Uuid) -> broadcast::Receiver<RoomMessage> {
        self.topics
            .entry(room)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send a message to every current subscriber of `room`, returning how many received it.
    ///
    /// Messages published on a topic nobody listens to are dropped.
    pub fn publish(&self, room: Uuid, message: RoomMessage) -> usize {
        let Some(sender) = self.topics.get(&room) else {
            return 0;
        };
        sender.send(message).unwrap_or(0)
    }

    /// Drop the topic of `room`; subscribers observe the channel closing.
    pub fn close(&self, room: Uuid) -> bool {
        self.topics.remove(&room).is_some()
    }

    /// Current subscriber count of `room`.
    pub fn subscriber_count(&self, room: Uuid) -> usize {
        self.topics
            .get(&room)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Rooms with a live topic.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}
