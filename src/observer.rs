//! Inbound event seam for an external booking-persistence layer.
//!
//! The engine's own mutations already recompute affected rooms inline. A
//! surrounding CRUD layer that writes bookings elsewhere drives this trait
//! instead: each lifecycle notification synchronously recomputes the room(s)
//! the booking touches. All of it is best-effort — a recompute failure never
//! propagates back into the booking write.

use async_trait::async_trait;
use ulid::Ulid;

use crate::engine::Engine;

#[async_trait]
pub trait RoomOccupancyObserver: Send + Sync {
    async fn on_booking_created(&self, room_id: Ulid);
    /// `previous_room` is set when the booking moved rooms; the vacated
    /// room may drop from occupied to available.
    async fn on_booking_updated(&self, room_id: Ulid, previous_room: Option<Ulid>);
    async fn on_booking_deleted(&self, room_id: Ulid);
    async fn on_booking_archived(&self, room_id: Ulid);
    async fn on_booking_restored(&self, room_id: Ulid);
}

#[async_trait]
impl RoomOccupancyObserver for Engine {
    async fn on_booking_created(&self, room_id: Ulid) {
        self.update_room_status(room_id).await;
    }

    async fn on_booking_updated(&self, room_id: Ulid, previous_room: Option<Ulid>) {
        if let Some(prev) = previous_room
            && prev != room_id
        {
            self.update_room_status(prev).await;
        }
        self.update_room_status(room_id).await;
    }

    async fn on_booking_deleted(&self, room_id: Ulid) {
        self.update_room_status(room_id).await;
    }

    async fn on_booking_archived(&self, room_id: Ulid) {
        self.update_room_status(room_id).await;
    }

    async fn on_booking_restored(&self, room_id: Ulid) {
        self.update_room_status(room_id).await;
    }
}
