use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_CREATED_TOTAL, BOOKINGS_REJECTED_TOTAL};

use super::conflict::{check_no_overlap, total_price, validate_request};
use super::{Engine, EngineError};

impl Engine {
    /// Validate, overlap-check, price and persist a reservation.
    ///
    /// The overlap check and the insert run under the room's write lock, so
    /// two concurrent requests for intersecting stays on one room can never
    /// both succeed. The new booking is always `Confirmed`.
    pub async fn create_booking(&self, request: BookingRequest) -> Result<BookingInfo, EngineError> {
        let result = self.try_create_booking(request).await;
        match &result {
            Ok(info) => {
                metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
                info!(
                    "booking {} confirmed: room {} for {:.2} nights, total {:.2}",
                    info.booking.id,
                    info.room.room_number,
                    super::nights(&info.booking.span),
                    info.booking.total
                );
            }
            Err(e) => {
                metrics::counter!(BOOKINGS_REJECTED_TOTAL, "reason" => e.reason()).increment(1);
                debug!("booking rejected: {e}");
            }
        }
        result
    }

    async fn try_create_booking(&self, request: BookingRequest) -> Result<BookingInfo, EngineError> {
        let (room_id, span) = validate_request(&request)?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;

        if guard.deleted {
            return Err(EngineError::RoomNotFound(room_id));
        }
        check_no_overlap(&guard, &span)?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        let booking = Booking {
            id: self.sequences.bookings.next(),
            room_id,
            guest_name: request.guest_name.trim().to_string(),
            span,
            total: total_price(&span, guard.room.price),
            status: BookingStatus::Confirmed,
        };
        let event = Event::BookingConfirmed {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        Ok(BookingInfo {
            booking,
            room: guard.room.clone(),
        })
    }

    /// Move a booking along its lifecycle:
    /// `Confirmed → CheckedIn → CheckedOut` or `Confirmed → Cancelled`.
    pub async fn transition_booking(
        &self,
        id: Id,
        to: BookingStatus,
    ) -> Result<BookingInfo, EngineError> {
        let room_id = self
            .room_for_booking(&id)
            .ok_or_else(|| EngineError::booking_not_found(id))?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;

        let current = guard
            .booking(id)
            .ok_or_else(|| EngineError::booking_not_found(id))?
            .status;
        if !current.can_transition_to(to) {
            return Err(EngineError::InvalidTransition { from: current, to });
        }

        let event = Event::BookingStatusChanged { id, room_id, status: to };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("booking {id}: {current} -> {to}");

        let booking = guard
            .booking(id)
            .cloned()
            .ok_or_else(|| EngineError::booking_not_found(id))?;
        Ok(BookingInfo {
            booking,
            room: guard.room.clone(),
        })
    }

    /// Cancel a confirmed booking. Its dates become bookable again.
    pub async fn cancel_booking(&self, id: Id) -> Result<BookingInfo, EngineError> {
        self.transition_booking(id, BookingStatus::Cancelled).await
    }
}
