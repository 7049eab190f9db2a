/// Maximum rooms a single room type may hold.
pub const MAX_ROOMS_PER_ROOM_TYPE: u32 = 10_000;

/// Maximum rooms one booking may allocate.
pub const MAX_ROOMS_PER_BOOKING: u32 = 500;

/// Maximum stay length in nights.
pub const MAX_STAY_NIGHTS: i64 = 366;

/// Maximum number of days in one daily-availability request.
pub const MAX_BATCH_DAYS: i64 = 366;

/// Maximum room number length in bytes.
pub const MAX_ROOM_NUMBER_LEN: usize = 32;
