use thiserror::Error;
use ulid::Ulid;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Hotel, room type, room or booking id does not resolve.
    #[error("not found: {0}")]
    NotFound(Ulid),

    #[error("already exists: {0}")]
    AlreadyExists(Ulid),

    /// Fewer free rooms than requested. Nothing was written.
    #[error("insufficient availability: requested {requested} rooms, {available} free")]
    InsufficientAvailability { requested: u32, available: u32 },

    #[error("validation error: {0}")]
    Validation(&'static str),

    /// The ledger already holds an overlapping ACTIVE occupancy on this room.
    /// Retry the allocation or fail the booking; never ignore it.
    #[error("concurrency conflict on room {0}")]
    ConcurrencyConflict(Ulid),

    #[error("room {0} still has active occupancies")]
    RoomInUse(Ulid),

    #[error("room number {0:?} already used in this hotel")]
    DuplicateRoomNumber(String),

    #[error("room type capacity {0} reached")]
    CapacityExceeded(u32),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("ledger write failed: {0}")]
    WalError(String),
}

impl EngineError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InsufficientAvailability { .. } => "insufficient_availability",
            EngineError::Validation(_) => "validation",
            EngineError::ConcurrencyConflict(_) => "concurrency_conflict",
            EngineError::RoomInUse(_) => "room_in_use",
            EngineError::DuplicateRoomNumber(_) => "duplicate_room_number",
            EngineError::CapacityExceeded(_) => "capacity_exceeded",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal",
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::WalError(e.to_string())
    }
}
