//! In-memory authoritative booking store.
//!
//! Holds the newest [`BOOKING_WINDOW`] bookings, newest first. Nothing is
//! persisted; a restart begins again at id 1 with an empty window.

use std::collections::VecDeque;

use chrono::Utc;
use shared::{
    domain::{ActorId, Booking, BookingId, BookingStatus, NewBooking, BOOKING_WINDOW},
    protocol::{ActionFailureReason, BookingAction, BookingStats},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("booking {0} not found")]
    NotFound(BookingId),
    #[error("booking is missing required fields: {}", .0.join(", "))]
    Malformed(Vec<&'static str>),
}

/// Why a transition was refused. Narrower than [`StoreError`]: a transition
/// never validates fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("booking {0} not found")]
    NotFound(BookingId),
    #[error("booking {id} is {status}, not pending")]
    InvalidState { id: BookingId, status: BookingStatus },
}

impl Rejection {
    pub fn reason(self) -> ActionFailureReason {
        match self {
            Self::NotFound(_) => ActionFailureReason::NotFound,
            Self::InvalidState { .. } => ActionFailureReason::NotPending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingStore {
    bookings: VecDeque<Booking>,
    capacity: usize,
    next_id: i64,
    total_created: u64,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::with_capacity(BOOKING_WINDOW)
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a custom window size. A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bookings: VecDeque::with_capacity(capacity + 1),
            capacity,
            next_id: 1,
            total_created: 0,
        }
    }

    /// Validates `fields`, assigns the next id and inserts the booking at the
    /// head of the window, evicting the oldest booking when over capacity.
    pub fn create(&mut self, fields: NewBooking) -> Result<Booking, StoreError> {
        let missing = fields.missing_fields();
        if !missing.is_empty() {
            return Err(StoreError::Malformed(missing));
        }

        let booking = Booking {
            id: BookingId(self.next_id),
            venue_name: fields.venue_name.trim().to_string(),
            party_type: fields.party_type.trim().to_string(),
            customer_name: fields.customer_name.trim().to_string(),
            time: fields.time.trim().to_string(),
            party_size: fields.party_size,
            status: BookingStatus::Pending,
            timestamp: Utc::now(),
            updated_at: None,
            updated_by: None,
        };
        self.next_id += 1;
        self.total_created += 1;

        self.bookings.push_front(booking.clone());
        self.bookings.truncate(self.capacity);
        Ok(booking)
    }

    pub fn get(&self, id: BookingId) -> Result<Booking, StoreError> {
        self.bookings
            .iter()
            .find(|booking| booking.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Resolves a pending booking. Resolution happens once; any later attempt
    /// fails with [`Rejection::InvalidState`] and leaves the record as is.
    pub fn transition(
        &mut self,
        id: BookingId,
        action: BookingAction,
        actor: ActorId,
    ) -> Result<Booking, Rejection> {
        let booking = self
            .bookings
            .iter_mut()
            .find(|booking| booking.id == id)
            .ok_or(Rejection::NotFound(id))?;

        if !booking.status.is_pending() {
            return Err(Rejection::InvalidState {
                id,
                status: booking.status,
            });
        }

        booking.status = action.target_status();
        booking.updated_at = Some(Utc::now());
        booking.updated_by = Some(actor);
        Ok(booking.clone())
    }

    /// Owned copy of the current window, newest first.
    pub fn snapshot(&self) -> Vec<Booking> {
        self.bookings.iter().cloned().collect()
    }

    pub fn stats(&self) -> BookingStats {
        BookingStats::from_bookings(&self.bookings)
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bookings ever created, evicted ones included.
    pub fn total_created(&self) -> u64 {
        self.total_created
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
