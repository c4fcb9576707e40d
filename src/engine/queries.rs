use std::cmp::Reverse;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Bookings on `room_id` that block `[check_in, check_out)`, in check-in
    /// order. An unknown room has no bookings.
    pub async fn find_overlapping_bookings(
        &self,
        room_id: Id,
        check_in: Ms,
        check_out: Ms,
    ) -> Result<Vec<Booking>, EngineError> {
        if check_out <= check_in {
            return Err(EngineError::InvalidDateRange { check_in, check_out });
        }
        let Some(rs) = self.get_room_state(&room_id) else {
            return Ok(vec![]);
        };
        let guard = rs.read().await;
        let query = Span::new(check_in, check_out);
        Ok(guard
            .overlapping(&query)
            .filter(|b| b.status.is_blocking())
            .cloned()
            .collect())
    }

    pub async fn get_booking(&self, id: Id) -> Result<BookingInfo, EngineError> {
        let room_id = self
            .room_for_booking(&id)
            .ok_or_else(|| EngineError::booking_not_found(id))?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or_else(|| EngineError::booking_not_found(id))?;
        let guard = rs.read().await;
        let booking = guard
            .booking(id)
            .cloned()
            .ok_or_else(|| EngineError::booking_not_found(id))?;
        Ok(BookingInfo {
            booking,
            room: guard.room.clone(),
        })
    }

    /// Every booking of the tenant joined with its room (deleted rooms
    /// included), most recent check-in first.
    pub async fn list_bookings(&self) -> Vec<BookingInfo> {
        let states: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in states {
            let guard = rs.read().await;
            out.extend(guard.bookings.iter().map(|b| BookingInfo {
                booking: b.clone(),
                room: guard.room.clone(),
            }));
        }
        sort_newest_first(&mut out);
        out
    }

    /// Bookings of a single room, most recent check-in first.
    pub async fn list_room_bookings(&self, room_id: Id) -> Result<Vec<BookingInfo>, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        let mut out: Vec<BookingInfo> = guard
            .bookings
            .iter()
            .map(|b| BookingInfo {
                booking: b.clone(),
                room: guard.room.clone(),
            })
            .collect();
        sort_newest_first(&mut out);
        Ok(out)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn booking_count(&self) -> usize {
        self.booking_to_room.len()
    }
}

fn sort_newest_first(bookings: &mut [BookingInfo]) {
    bookings.sort_by_key(|info| (Reverse(info.booking.check_in()), Reverse(info.booking.id)));
}
