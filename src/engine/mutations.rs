use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::StatusChange;

use super::{Engine, EngineError};

impl Engine {
    pub async fn create_room(
        &self,
        id: Ulid,
        number: String,
        capacity: u32,
    ) -> Result<(), EngineError> {
        if self.rooms.len() >= MAX_ROOMS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if number.is_empty() || number.len() > MAX_ROOM_NUMBER_LEN {
            return Err(EngineError::LimitExceeded("room number length"));
        }
        if capacity == 0 {
            return Err(EngineError::LimitExceeded("capacity must be positive"));
        }
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        // Uniqueness scan and insert must be one step.
        let _admin = self.admin_lock.lock().await;
        self.ensure_number_free(&number, None).await?;

        let event = Event::RoomCreated {
            id,
            number: number.clone(),
            capacity,
        };
        self.wal_append(&event).await?;
        let rs = RoomState::new(id, number, capacity);
        self.rooms.insert(id, Arc::new(RwLock::new(rs)));
        metrics::gauge!(crate::observability::ROOMS_TOTAL).set(self.rooms.len() as f64);
        Ok(())
    }

    pub async fn update_room(
        &self,
        id: Ulid,
        number: String,
        capacity: u32,
    ) -> Result<(), EngineError> {
        if number.is_empty() || number.len() > MAX_ROOM_NUMBER_LEN {
            return Err(EngineError::LimitExceeded("room number length"));
        }
        if capacity == 0 {
            return Err(EngineError::LimitExceeded("capacity must be positive"));
        }
        let _admin = self.admin_lock.lock().await;
        self.ensure_number_free(&number, Some(id)).await?;
        let rs = self.get_room(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;

        let event = Event::RoomUpdated {
            id,
            number,
            capacity,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        // A capacity change can flip the derived status; best-effort.
        self.recompute_status(&mut guard).await;
        Ok(())
    }

    /// Administrative status override. The only way in or out of
    /// maintenance — the derivation never touches that state.
    pub async fn set_room_status(&self, id: Ulid, status: RoomStatus) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if guard.status == status {
            return Ok(());
        }
        let from = guard.status;
        let event = Event::RoomStatusSet { id, status };
        self.persist_and_apply(&mut guard, &event).await?;
        self.feed.send(StatusChange {
            room_id: id,
            from,
            to: status,
            at: now_ms(),
        });
        Ok(())
    }

    /// Soft delete. Occupancy is untouched; the room just leaves the
    /// active pool.
    pub async fn archive_room(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if guard.archived_at.is_some() {
            return Ok(());
        }
        let event = Event::RoomArchived { id, at: now_ms() };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Return a room to the active pool. Status is deliberately not
    /// recomputed here; the next booking event or sweep will settle it.
    pub async fn restore_room(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if guard.archived_at.is_none() {
            return Ok(());
        }
        let event = Event::RoomRestored { id };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Hard delete. Refused while active bookings remain. The write guard
    /// is held from the occupancy check through the map removal, so no
    /// booking can slip in between; the state is marked dead under the
    /// guard so a writer that resolved the Arc earlier fails its
    /// `is_active` check instead of resurrecting the room.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if guard.active_occupancy() > 0 {
            return Err(EngineError::HasActiveBookings(id));
        }

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        guard.archived_at = Some(now_ms());
        self.rooms.remove(&id);
        for b in &guard.bookings {
            self.booking_to_room.remove(&b.id);
        }
        self.feed.remove(&id);
        metrics::gauge!(crate::observability::ROOMS_TOTAL).set(self.rooms.len() as f64);
        Ok(())
    }

    // ── Booking lifecycle ────────────────────────────────────────

    /// Assign a student to a room. The capacity check runs under the room's
    /// write lock and the booking is inserted before the lock is released,
    /// so two concurrent creations against the last free bed admit exactly
    /// one — the other gets `CapacityExceeded`.
    pub async fn create_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        student_id: Ulid,
        moved_in_at: Ms,
        semesters: u32,
    ) -> Result<(), EngineError> {
        validate_semesters(semesters)?;
        if self.booking_to_room.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;
        if !guard.is_active() {
            return Err(EngineError::RoomArchived(room_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        if guard.is_at_capacity() {
            metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL).increment(1);
            return Err(EngineError::CapacityExceeded {
                room: room_id,
                capacity: guard.capacity,
            });
        }

        let event = Event::BookingCreated {
            id,
            room_id,
            student_id,
            moved_in_at,
            semesters,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        self.recompute_status(&mut guard).await;
        Ok(())
    }

    /// Edit a booking's room, move-in or duration. A room move locks both
    /// rooms in sorted id order, capacity-checks the destination, and
    /// recomputes both — the vacated room may drop back to available.
    pub async fn update_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        moved_in_at: Ms,
        semesters: u32,
    ) -> Result<(), EngineError> {
        validate_semesters(semesters)?;
        let current_room = self
            .room_of_booking(&id)
            .ok_or(EngineError::BookingNotFound(id))?;

        if current_room == room_id {
            let (_, mut guard) = self.resolve_booking_write(&id).await?;
            let event = Event::BookingUpdated {
                id,
                room_id,
                moved_in_at,
                semesters,
            };
            self.persist_and_apply(&mut guard, &event).await?;
            self.recompute_status(&mut guard).await;
            return Ok(());
        }

        // Lock both rooms in sorted order to prevent deadlocks.
        let src = self
            .get_room(&current_room)
            .ok_or(EngineError::RoomNotFound(current_room))?;
        let dst = self
            .get_room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let (mut src_guard, mut dst_guard) = if current_room < room_id {
            let a = src.write_owned().await;
            let b = dst.write_owned().await;
            (a, b)
        } else {
            let b = dst.write_owned().await;
            let a = src.write_owned().await;
            (a, b)
        };

        if !dst_guard.is_active() {
            return Err(EngineError::RoomArchived(room_id));
        }
        if dst_guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        let booking = src_guard
            .booking(id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(id))?;
        if booking.is_active() && dst_guard.is_at_capacity() {
            metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL).increment(1);
            return Err(EngineError::CapacityExceeded {
                room: room_id,
                capacity: dst_guard.capacity,
            });
        }

        let event = Event::BookingUpdated {
            id,
            room_id,
            moved_in_at,
            semesters,
        };
        self.wal_append(&event).await?;

        let mut moved = src_guard.remove_booking(id).unwrap_or(booking);
        moved.moved_in_at = moved_in_at;
        moved.semesters = semesters;
        dst_guard.bookings.push(moved);
        self.booking_to_room.insert(id, room_id);

        // Vacated room first: it may drop from occupied to available.
        self.recompute_status(&mut src_guard).await;
        self.recompute_status(&mut dst_guard).await;
        Ok(())
    }

    /// The stay is over: the booking stops counting toward occupancy.
    /// Archiving an archived booking is a no-op.
    pub async fn archive_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;
        let Some(b) = guard.booking(id) else {
            return Err(EngineError::BookingNotFound(id));
        };
        if !b.is_active() {
            return Ok(());
        }
        let event = Event::BookingArchived {
            id,
            room_id,
            at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        self.recompute_status(&mut guard).await;
        Ok(())
    }

    /// Undo an archive: the booking counts again. Never capacity-rejected —
    /// occupancy above capacity is tolerated and simply reads as occupied.
    pub async fn restore_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;
        let Some(b) = guard.booking(id) else {
            return Err(EngineError::BookingNotFound(id));
        };
        if b.is_active() {
            return Ok(());
        }
        let event = Event::BookingRestored { id, room_id };
        self.persist_and_apply(&mut guard, &event).await?;
        self.recompute_status(&mut guard).await;
        Ok(())
    }

    /// Administrative force-delete.
    pub async fn delete_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;
        let event = Event::BookingDeleted { id, room_id };
        self.persist_and_apply(&mut guard, &event).await?;
        self.recompute_status(&mut guard).await;
        Ok(())
    }

    async fn ensure_number_free(
        &self,
        number: &str,
        exclude: Option<Ulid>,
    ) -> Result<(), EngineError> {
        let rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in rooms {
            let guard = rs.read().await;
            if Some(guard.id) == exclude {
                continue;
            }
            if guard.is_active() && guard.number == number {
                return Err(EngineError::DuplicateRoomNumber(number.to_string()));
            }
        }
        Ok(())
    }
}

fn validate_semesters(semesters: u32) -> Result<(), EngineError> {
    if semesters == 0 {
        return Err(EngineError::LimitExceeded("semesters must be positive"));
    }
    if semesters > MAX_SEMESTERS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}
