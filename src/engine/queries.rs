use ulid::Ulid;

use crate::model::*;

use super::Engine;

impl Engine {
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(rooms.len());
        for rs in rooms {
            let guard = rs.read().await;
            out.push(RoomInfo::of(&guard));
        }
        out.sort_by(|a, b| a.number.cmp(&b.number));
        out
    }

    pub async fn room_info(&self, room_id: Ulid) -> Option<RoomInfo> {
        let rs = self.get_room(&room_id)?;
        let guard = rs.read().await;
        Some(RoomInfo::of(&guard))
    }

    /// Bookings attached to a room. `include_archived` is explicit — there
    /// is no ambient "active only" filter to forget about.
    pub async fn room_bookings(&self, room_id: Ulid, include_archived: bool) -> Vec<BookingInfo> {
        let Some(rs) = self.get_room(&room_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard
            .bookings
            .iter()
            .filter(|b| include_archived || b.is_active())
            .map(|b| booking_info(room_id, b))
            .collect()
    }

    pub async fn booking_info(&self, booking_id: Ulid) -> Option<BookingInfo> {
        let room_id = self.room_of_booking(&booking_id)?;
        let rs = self.get_room(&room_id)?;
        let guard = rs.read().await;
        guard.booking(booking_id).map(|b| booking_info(room_id, b))
    }
}

fn booking_info(room_id: Ulid, b: &Booking) -> BookingInfo {
    BookingInfo {
        id: b.id,
        room_id,
        student_id: b.student_id,
        moved_in_at: b.moved_in_at,
        semesters: b.semesters,
        ends_at: b.ends_at(),
        archived: !b.is_active(),
    }
}
