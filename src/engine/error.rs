use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    RoomNotFound(Ulid),
    BookingNotFound(Ulid),
    AlreadyExists(Ulid),
    DuplicateRoomNumber(String),
    RoomArchived(Ulid),
    HasActiveBookings(Ulid),
    CapacityExceeded { room: Ulid, capacity: u32 },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::DuplicateRoomNumber(n) => {
                write!(f, "room number already in use: {n}")
            }
            EngineError::RoomArchived(id) => write!(f, "room is archived: {id}"),
            EngineError::HasActiveBookings(id) => {
                write!(f, "cannot delete room {id}: has active bookings")
            }
            EngineError::CapacityExceeded { room, capacity } => {
                write!(f, "room {room} is at capacity ({capacity}): booking rejected")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
