use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const DAY_MS: Ms = 86_400_000;

/// One semester of stay, as a duration. Bookings are measured in semesters;
/// the stay window is derived, never stored.
pub const SEMESTER_MS: Ms = 182 * DAY_MS;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// The UTC day `[midnight, next midnight)` containing `now`.
pub fn day_window(now: Ms) -> (Ms, Ms) {
    let start = now - now.rem_euclid(DAY_MS);
    (start, start + DAY_MS)
}

/// Room availability status. `Maintenance` is an absorbing state: the
/// derivation never enters or leaves it, only an administrative edit does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Occupied,
    Maintenance,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Occupied => "occupied",
            RoomStatus::Maintenance => "maintenance",
        }
    }
}

/// A student's stay in a room. Owned by the room it occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub student_id: Ulid,
    /// Stay window start (move-in).
    pub moved_in_at: Ms,
    /// Stay length in semesters (>= 1).
    pub semesters: u32,
    /// Null means active; an archived booking counts toward no room.
    pub archived_at: Option<Ms>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.archived_at.is_none()
    }

    /// Derived stay end: move-in plus the semester count.
    pub fn ends_at(&self) -> Ms {
        self.moved_in_at + Ms::from(self.semesters) * SEMESTER_MS
    }

    pub fn starts_within(&self, start: Ms, end: Ms) -> bool {
        start <= self.moved_in_at && self.moved_in_at < end
    }

    /// The stay has run out before `end` (exclusive). Deliberately open at
    /// the low side: a window that ended days ago still counts, so a pass
    /// that skipped a day catches up instead of losing the check-out.
    pub fn ended_before(&self, end: Ms) -> bool {
        self.ends_at() < end
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    /// Display key, unique among a dormitory's active rooms.
    pub number: String,
    /// Max concurrent active bookings (>= 1).
    pub capacity: u32,
    pub status: RoomStatus,
    /// Null means active.
    pub archived_at: Option<Ms>,
    /// All bookings, archived ones included.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, number: String, capacity: u32) -> Self {
        Self {
            id,
            number,
            capacity,
            status: RoomStatus::Available,
            archived_at: None,
            bookings: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.archived_at.is_none()
    }

    /// Count of active (non-archived) bookings.
    pub fn active_occupancy(&self) -> u32 {
        self.bookings.iter().filter(|b| b.is_active()).count() as u32
    }

    pub fn is_at_capacity(&self) -> bool {
        self.active_occupancy() >= self.capacity
    }

    /// Free beds: `max(0, capacity - occupancy)`.
    pub fn available_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.active_occupancy())
    }

    /// What the status should be, from the bookings alone.
    /// `None` while in maintenance — the derivation keeps its hands off.
    pub fn derived_status(&self) -> Option<RoomStatus> {
        if self.status == RoomStatus::Maintenance {
            return None;
        }
        Some(if self.is_at_capacity() {
            RoomStatus::Occupied
        } else {
            RoomStatus::Available
        })
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        number: String,
        capacity: u32,
    },
    RoomUpdated {
        id: Ulid,
        number: String,
        capacity: u32,
    },
    /// Covers both derived changes and administrative overrides.
    RoomStatusSet {
        id: Ulid,
        status: RoomStatus,
    },
    RoomArchived {
        id: Ulid,
        at: Ms,
    },
    RoomRestored {
        id: Ulid,
    },
    RoomDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        student_id: Ulid,
        moved_in_at: Ms,
        semesters: u32,
    },
    /// `room_id` is the room after the update; it may differ from the
    /// room the booking previously sat in.
    BookingUpdated {
        id: Ulid,
        room_id: Ulid,
        moved_in_at: Ms,
        semesters: u32,
    },
    BookingArchived {
        id: Ulid,
        room_id: Ulid,
        at: Ms,
    },
    BookingRestored {
        id: Ulid,
        room_id: Ulid,
    },
    BookingDeleted {
        id: Ulid,
        room_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub id: Ulid,
    pub number: String,
    pub capacity: u32,
    pub status: RoomStatus,
    pub occupancy: u32,
    pub available_capacity: u32,
    pub archived: bool,
}

impl RoomInfo {
    pub fn of(rs: &RoomState) -> Self {
        Self {
            id: rs.id,
            number: rs.number.clone(),
            capacity: rs.capacity,
            status: rs.status,
            occupancy: rs.active_occupancy(),
            available_capacity: rs.available_capacity(),
            archived: rs.archived_at.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub student_id: Ulid,
    pub moved_in_at: Ms,
    pub semesters: u32,
    pub ends_at: Ms,
    pub archived: bool,
}

/// Per-dormitory status breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyStats {
    pub total_rooms: u32,
    pub available: u32,
    pub occupied: u32,
    pub maintenance: u32,
    /// Percent of rooms occupied, one decimal. 0.0 for an empty dormitory.
    pub occupancy_rate: f64,
}

impl OccupancyStats {
    pub fn compute(available: u32, occupied: u32, maintenance: u32) -> Self {
        let total_rooms = available + occupied + maintenance;
        let occupancy_rate = if total_rooms == 0 {
            0.0
        } else {
            (f64::from(occupied) / f64::from(total_rooms) * 1000.0).round() / 10.0
        };
        Self {
            total_rooms,
            available,
            occupied,
            maintenance,
            occupancy_rate,
        }
    }
}

/// Rooms whose status flipped during a daily boundary pass, grouped by the
/// direction of the flip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyReport {
    /// Flipped to occupied: a stay window started today.
    pub check_ins: Vec<Ulid>,
    /// Flipped to available: a stay window ended today.
    pub check_outs: Vec<Ulid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(semesters: u32, archived: bool) -> Booking {
        Booking {
            id: Ulid::new(),
            student_id: Ulid::new(),
            moved_in_at: 0,
            semesters,
            archived_at: archived.then_some(1),
        }
    }

    #[test]
    fn occupancy_counts_only_active() {
        let mut rs = RoomState::new(Ulid::new(), "101".into(), 2);
        rs.bookings.push(booking(1, false));
        rs.bookings.push(booking(1, true));
        rs.bookings.push(booking(2, false));
        assert_eq!(rs.active_occupancy(), 2);
        assert!(rs.is_at_capacity());
        assert_eq!(rs.available_capacity(), 0);
    }

    #[test]
    fn at_capacity_boundary() {
        let mut rs = RoomState::new(Ulid::new(), "101".into(), 2);
        rs.bookings.push(booking(1, false));
        assert!(!rs.is_at_capacity());
        assert_eq!(rs.available_capacity(), 1);
        rs.bookings.push(booking(1, false));
        assert!(rs.is_at_capacity());
        // Over capacity still reads as at-capacity, never underflows.
        rs.bookings.push(booking(1, false));
        assert!(rs.is_at_capacity());
        assert_eq!(rs.available_capacity(), 0);
    }

    #[test]
    fn derived_status_follows_occupancy() {
        let mut rs = RoomState::new(Ulid::new(), "101".into(), 1);
        assert_eq!(rs.derived_status(), Some(RoomStatus::Available));
        rs.bookings.push(booking(1, false));
        assert_eq!(rs.derived_status(), Some(RoomStatus::Occupied));
    }

    #[test]
    fn derived_status_none_in_maintenance() {
        let mut rs = RoomState::new(Ulid::new(), "101".into(), 1);
        rs.status = RoomStatus::Maintenance;
        assert_eq!(rs.derived_status(), None);
        rs.bookings.push(booking(1, false));
        assert_eq!(rs.derived_status(), None);
    }

    #[test]
    fn stay_window_from_semesters() {
        let b = Booking {
            id: Ulid::new(),
            student_id: Ulid::new(),
            moved_in_at: 1_000,
            semesters: 2,
            archived_at: None,
        };
        assert_eq!(b.ends_at(), 1_000 + 2 * SEMESTER_MS);
        assert!(b.starts_within(0, DAY_MS));
        assert!(!b.starts_within(DAY_MS, 2 * DAY_MS));
        let (_, end) = day_window(b.ends_at() + 5);
        assert!(b.ended_before(end));
        // Still true days later, not at all before the window runs out.
        assert!(b.ended_before(end + 3 * DAY_MS));
        assert!(!b.ended_before(b.ends_at()));
    }

    #[test]
    fn day_window_covers_now() {
        let now = 3 * DAY_MS + 12_345;
        let (start, end) = day_window(now);
        assert_eq!(start, 3 * DAY_MS);
        assert_eq!(end, 4 * DAY_MS);
        assert!(start <= now && now < end);
    }

    #[test]
    fn stats_rounding() {
        let s = OccupancyStats::compute(6, 3, 1);
        assert_eq!(s.total_rooms, 10);
        assert_eq!(s.occupancy_rate, 30.0);
        let s = OccupancyStats::compute(2, 1, 0);
        assert_eq!(s.occupancy_rate, 33.3);
        let s = OccupancyStats::compute(0, 0, 0);
        assert_eq!(s.occupancy_rate, 0.0);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            id: Ulid::new(),
            room_id: Ulid::new(),
            student_id: Ulid::new(),
            moved_in_at: 42,
            semesters: 2,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
