use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Ms, RoomStatus};

const CHANNEL_CAPACITY: usize = 256;

/// A room's stored status flipping, whether from a booking event, a sweep,
/// or an administrative override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub room_id: Ulid,
    pub from: RoomStatus,
    pub to: RoomStatus,
    pub at: Ms,
}

/// Broadcast hub for per-room status changes. The administrative layer
/// subscribes here instead of polling.
pub struct StatusFeed {
    channels: DashMap<Ulid, broadcast::Sender<StatusChange>>,
}

impl StatusFeed {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to status changes for a room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<StatusChange> {
        let sender = self
            .channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a change. No-op if nobody is listening.
    pub fn send(&self, change: StatusChange) {
        if let Some(sender) = self.channels.get(&change.room_id) {
            let _ = sender.send(change);
        }
    }

    /// Drop a room's channel (e.g. when the room is deleted).
    pub fn remove(&self, room_id: &Ulid) {
        self.channels.remove(room_id);
    }
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let feed = StatusFeed::new();
        let rid = Ulid::new();
        let mut rx = feed.subscribe(rid);

        let change = StatusChange {
            room_id: rid,
            from: RoomStatus::Available,
            to: RoomStatus::Occupied,
            at: 1_000,
        };
        feed.send(change);

        assert_eq!(rx.recv().await.unwrap(), change);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let feed = StatusFeed::new();
        feed.send(StatusChange {
            room_id: Ulid::new(),
            from: RoomStatus::Occupied,
            to: RoomStatus::Available,
            at: 0,
        });
    }
}
