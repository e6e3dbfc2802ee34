mod error;
mod mutations;
mod queries;
mod status;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::StatusFeed;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── WAL writer channel ───────────────────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL. Serializes appends and compaction so
/// the engine never blocks a request handler on file I/O locks.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let start = std::time::Instant::now();
                let result = wal.append(&event);
                metrics::histogram!(crate::observability::WAL_APPEND_DURATION_SECONDS)
                    .record(start.elapsed().as_secs_f64());
                let _ = response.send(result);
            }
            WalCommand::Compact { events, response } => {
                let result = Wal::write_compact_file(wal.path(), &events)
                    .and_then(|()| wal.swap_compact_file());
                let _ = response.send(result);
            }
            WalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(wal.appends_since_compact());
            }
        }
    }
}

/// One dormitory's occupancy engine: the room map, the booking index, and
/// the event log. Every mutation is WAL-first, then applied in memory.
pub struct Engine {
    pub rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub feed: Arc<StatusFeed>,
    /// Reverse lookup: booking id → room id.
    pub(super) booking_to_room: DashMap<Ulid, Ulid>,
    /// Serializes room create/update so the number-uniqueness scan and the
    /// insert are one step. Room admin is rare; booking paths never take it.
    pub(super) admin_lock: Mutex<()>,
}

/// Apply a room-scoped event to a RoomState. No locking — the caller holds
/// the write guard. Room create/delete and cross-room booking moves are
/// handled at the map level, not here.
fn apply_to_room(rs: &mut RoomState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::RoomUpdated {
            number, capacity, ..
        } => {
            rs.number = number.clone();
            rs.capacity = *capacity;
        }
        Event::RoomStatusSet { status, .. } => {
            rs.status = *status;
        }
        Event::RoomArchived { at, .. } => {
            rs.archived_at = Some(*at);
        }
        Event::RoomRestored { .. } => {
            rs.archived_at = None;
        }
        Event::BookingCreated {
            id,
            room_id,
            student_id,
            moved_in_at,
            semesters,
        } => {
            rs.bookings.push(Booking {
                id: *id,
                student_id: *student_id,
                moved_in_at: *moved_in_at,
                semesters: *semesters,
                archived_at: None,
            });
            index.insert(*id, *room_id);
        }
        Event::BookingUpdated {
            id,
            moved_in_at,
            semesters,
            ..
        } => {
            if let Some(b) = rs.booking_mut(*id) {
                b.moved_in_at = *moved_in_at;
                b.semesters = *semesters;
            }
        }
        Event::BookingArchived { id, at, .. } => {
            if let Some(b) = rs.booking_mut(*id) {
                b.archived_at = Some(*at);
            }
        }
        Event::BookingRestored { id, .. } => {
            if let Some(b) = rs.booking_mut(*id) {
                b.archived_at = None;
            }
        }
        Event::BookingDeleted { id, .. } => {
            rs.remove_booking(*id);
            index.remove(id);
        }
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, feed: Arc<StatusFeed>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            wal_tx,
            feed,
            booking_to_room: DashMap::new(),
            admin_lock: Mutex::new(()),
        };
        for event in &events {
            engine.apply_replay_event(event);
        }
        Ok(engine)
    }

    /// Replay-time apply. We are the sole owner of the Arcs here, so
    /// try_write always succeeds instantly. Never blocking_write — replay
    /// may run inside an async context (lazy tenant creation).
    fn apply_replay_event(&self, event: &Event) {
        match event {
            Event::RoomCreated {
                id,
                number,
                capacity,
            } => {
                let rs = RoomState::new(*id, number.clone(), *capacity);
                self.rooms.insert(*id, Arc::new(RwLock::new(rs)));
            }
            Event::RoomDeleted { id } => {
                if let Some((_, rs)) = self.rooms.remove(id) {
                    let guard = rs.try_read().expect("replay: uncontended read");
                    for b in &guard.bookings {
                        self.booking_to_room.remove(&b.id);
                    }
                }
            }
            Event::BookingUpdated { id, room_id, .. } => {
                // A move shows up as the indexed room differing from the
                // event's room: relocate the booking first, then apply.
                let previous = self.booking_to_room.get(id).map(|e| *e.value());
                if let Some(prev) = previous
                    && prev != *room_id
                    && let Some(old) = self.rooms.get(&prev).map(|e| e.value().clone())
                {
                    let mut old_guard = old.try_write().expect("replay: uncontended write");
                    if let Some(moved) = old_guard.remove_booking(*id)
                        && let Some(new) = self.rooms.get(room_id).map(|e| e.value().clone())
                    {
                        let mut new_guard = new.try_write().expect("replay: uncontended write");
                        new_guard.bookings.push(moved);
                    }
                    self.booking_to_room.insert(*id, *room_id);
                }
                if let Some(rs) = self.rooms.get(room_id).map(|e| e.value().clone()) {
                    let mut guard = rs.try_write().expect("replay: uncontended write");
                    apply_to_room(&mut guard, event, &self.booking_to_room);
                }
            }
            other => {
                if let Some(room_id) = event_room_id(other)
                    && let Some(rs) = self.rooms.get(&room_id).map(|e| e.value().clone())
                {
                    let mut guard = rs.try_write().expect("replay: uncontended write");
                    apply_to_room(&mut guard, other, &self.booking_to_room);
                }
            }
        }
    }

    /// Write an event to the WAL via the background writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_of_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + in-memory apply in one call.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event, &self.booking_to_room);
        Ok(())
    }

    /// Lookup booking → room, get room, acquire the write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .room_of_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.write_owned().await;
        Ok((room_id, guard))
    }

    /// Rewrite the WAL with only the events needed to recreate current state:
    /// one create + one status + optional archive per room, one create
    /// (+ optional archive) per booking.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        for entry in self.rooms.iter() {
            let rs = entry.value().clone();
            let guard = match rs.try_read() {
                Ok(g) => g,
                Err(_) => return Err(EngineError::WalError("room busy during compact".into())),
            };
            events.push(Event::RoomCreated {
                id: guard.id,
                number: guard.number.clone(),
                capacity: guard.capacity,
            });
            events.push(Event::RoomStatusSet {
                id: guard.id,
                status: guard.status,
            });
            if let Some(at) = guard.archived_at {
                events.push(Event::RoomArchived { id: guard.id, at });
            }
            for b in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    room_id: guard.id,
                    student_id: b.student_id,
                    moved_in_at: b.moved_in_at,
                    semesters: b.semesters,
                });
                if let Some(at) = b.archived_at {
                    events.push(Event::BookingArchived {
                        id: b.id,
                        room_id: guard.id,
                        at,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomUpdated { id, .. }
        | Event::RoomStatusSet { id, .. }
        | Event::RoomArchived { id, .. }
        | Event::RoomRestored { id } => Some(*id),
        Event::BookingCreated { room_id, .. }
        | Event::BookingUpdated { room_id, .. }
        | Event::BookingArchived { room_id, .. }
        | Event::BookingRestored { room_id, .. }
        | Event::BookingDeleted { room_id, .. } => Some(*room_id),
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } => None,
    }
}
