//! Hard limits. Everything user-supplied is bounded.

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 64;
pub const MAX_ROOMS_PER_TENANT: usize = 100_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 4096;
pub const MAX_ROOM_NUMBER_LEN: usize = 32;
/// Longest plausible stay, in semesters.
pub const MAX_SEMESTERS: u32 = 40;
