use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Field and range validation for a reservation request. Returns the room
/// id and the requested stay.
pub(crate) fn validate_request(request: &BookingRequest) -> Result<(Id, Span), EngineError> {
    let guest_name = request.guest_name.trim();
    if guest_name.is_empty() {
        return Err(EngineError::InvalidInput("guest_name is required"));
    }
    if guest_name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("guest name too long"));
    }
    let room_id = match request.room_id {
        Some(id) if id != 0 => id,
        _ => return Err(EngineError::InvalidInput("room_id is required")),
    };
    let check_in = request
        .check_in
        .ok_or(EngineError::InvalidInput("check_in is required"))?;
    let check_out = request
        .check_out
        .ok_or(EngineError::InvalidInput("check_out is required"))?;

    if check_out <= check_in {
        return Err(EngineError::InvalidDateRange { check_in, check_out });
    }
    let span = Span::new(check_in, check_out);
    validate_span(&span)?;
    Ok((room_id, span))
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_STAY_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// Fails with the first blocking booking on the room that intersects `span`.
/// Cancelled bookings never block.
pub(crate) fn check_no_overlap(rs: &RoomState, span: &Span) -> Result<(), EngineError> {
    match rs.overlapping(span).find(|b| b.status.is_blocking()) {
        Some(existing) => Err(EngineError::BookingConflict(existing.id)),
        None => Ok(()),
    }
}

/// Stay length in 24-hour units. Not floored: a 36-hour stay is 1.5 nights.
pub fn nights(span: &Span) -> f64 {
    span.duration_ms() as f64 / MS_PER_DAY as f64
}

pub fn total_price(span: &Span, nightly_rate: f64) -> f64 {
    nights(span) * nightly_rate
}
