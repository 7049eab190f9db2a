use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// The server's local calendar day.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub(crate) fn validate_stay(stay: &Stay) -> Result<(), EngineError> {
    if !stay.is_valid() {
        return Err(EngineError::Validation("check-out must be after check-in"));
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

pub(crate) fn validate_room_count(requested: u32) -> Result<(), EngineError> {
    if requested == 0 {
        return Err(EngineError::Validation("room count must be positive"));
    }
    if requested > MAX_ROOMS_PER_BOOKING {
        return Err(EngineError::LimitExceeded("too many rooms in one booking"));
    }
    Ok(())
}

pub(crate) fn validate_room_number(number: &str) -> Result<(), EngineError> {
    if number.trim().is_empty() {
        return Err(EngineError::Validation("room number must not be empty"));
    }
    if number.len() > MAX_ROOM_NUMBER_LEN {
        return Err(EngineError::LimitExceeded("room number too long"));
    }
    Ok(())
}

/// Storage-level guard for the no-double-booking invariant: no two ACTIVE
/// occupancies on one room may overlap, whatever the selection logic decided.
pub(crate) fn check_room_free(ps: &PoolState, room_id: &RoomId, stay: &Stay) -> Result<(), EngineError> {
    if ps
        .active_overlapping(stay)
        .any(|o| o.room_id == *room_id)
    {
        return Err(EngineError::ConcurrencyConflict(*room_id));
    }
    Ok(())
}
