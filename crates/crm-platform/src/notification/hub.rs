//! Live notification rooms
//!
//! One broadcast channel per user, keyed `user-<id>`. Publishing never
//! blocks: with no subscriber the message is dropped.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::entity::NotificationResponse;

const DEFAULT_ROOM_CAPACITY: usize = 64;

pub fn room_name(user_id: &str) -> String {
    format!("user-{}", user_id)
}

pub struct NotificationHub {
    rooms: DashMap<String, broadcast::Sender<NotificationResponse>>,
    capacity: usize,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Join the user's room, creating it on first use.
    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<NotificationResponse> {
        self.rooms
            .entry(room_name(user_id))
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Push to every live subscriber. Returns how many received it.
    pub fn publish(&self, user_id: &str, notification: NotificationResponse) -> usize {
        let room = room_name(user_id);
        let delivered = match self.rooms.get(&room) {
            Some(sender) => sender.send(notification).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            // Last subscriber went away
            self.rooms.remove_if(&room, |_, sender| sender.receiver_count() == 0);
            debug!(room = %room, "No live subscriber, notification not pushed");
        }
        delivered
    }
}
