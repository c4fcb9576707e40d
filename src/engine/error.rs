use thiserror::Error;

use crate::model::{BookingStatus, CatalogKind, Id, Ms};

#[derive(Debug, Error)]
pub enum EngineError {
    /// A required field is missing, empty or out of its value domain.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("invalid date range: check-out {check_out} must be after check-in {check_in}")]
    InvalidDateRange { check_in: Ms, check_out: Ms },
    #[error("room is already booked for the selected dates (conflicts with booking {0})")]
    BookingConflict(Id),
    #[error("room not found: {0}")]
    RoomNotFound(Id),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Id },
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },
    #[error("cannot delete room {0}: it has active bookings")]
    RoomInUse(Id),
    #[error("booking cannot move from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    pub(crate) fn booking_not_found(id: Id) -> Self {
        EngineError::NotFound { kind: "booking", id }
    }

    pub(crate) fn catalog_not_found(kind: CatalogKind, id: Id) -> Self {
        EngineError::NotFound {
            kind: kind.table(),
            id,
        }
    }

    /// Short machine-readable reason, used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::InvalidDateRange { .. } => "invalid_date_range",
            EngineError::BookingConflict(_) => "conflict",
            EngineError::RoomNotFound(_) => "room_not_found",
            EngineError::NotFound { .. } => "not_found",
            EngineError::AlreadyExists { .. } => "already_exists",
            EngineError::RoomInUse(_) => "room_in_use",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Persistence(_) => "persistence",
        }
    }
}
