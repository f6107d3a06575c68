use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rollcall_core::repository::BOOKING_PAIR_CONSTRAINT;
use rollcall_core::{Booking, ConflictReason, CoreError, CoreResult, EventRepository, Resource, StoreError};
use tracing::{debug, info, warn};

use crate::request::BookingRequest;

/// Decides whether a booking request is admitted.
///
/// Everything from the event lookup to the commit happens while holding the event's
/// lock, so the duplicate check, the occupancy count and the insert form one decision.
/// Requests for different events never wait on each other.
#[derive(Clone)]
pub struct AdmissionController {
    events: Arc<dyn EventRepository>,
    lock_wait: Duration,
}

impl AdmissionController {
    pub fn new(events: Arc<dyn EventRepository>, lock_wait: Duration) -> Self {
        Self { events, lock_wait }
    }

    /// Runs the checks in order; the first failure is returned and nothing is written.
    pub async fn book(&self, request: BookingRequest) -> CoreResult<Booking> {
        let BookingRequest { event_id, attendee_id } = request;

        let mut guard = self
            .events
            .lock_event(event_id, self.lock_wait)
            .await
            .inspect_err(|e| warn!("Could not lock event {}: {}", event_id, e))?
            .ok_or(CoreError::NotFound(Resource::Event))?;

        if !guard.attendee_exists(attendee_id).await? {
            return Err(CoreError::NotFound(Resource::Attendee));
        }

        if guard.has_booking(attendee_id).await? {
            debug!("Attendee {} already holds a seat at event {}", attendee_id, event_id);
            return Err(CoreError::Conflict(ConflictReason::DuplicateBooking));
        }

        let capacity = i64::from(guard.event().capacity);
        let booked = guard.booked_count().await?;
        if booked >= capacity {
            debug!("Event {} is full ({}/{})", event_id, booked, capacity);
            return Err(CoreError::Conflict(ConflictReason::EventFull));
        }

        let booking = guard
            .insert_booking(attendee_id, Utc::now())
            .await
            .map_err(pair_conflict)?;
        guard.commit().await.map_err(pair_conflict)?;

        info!(
            "Booking {} admitted: attendee {} at event {} ({}/{})",
            booking.id,
            attendee_id,
            event_id,
            booked + 1,
            capacity
        );
        Ok(booking)
    }
}

fn pair_conflict(err: StoreError) -> CoreError {
    match err {
        StoreError::Duplicate { ref constraint } if constraint == BOOKING_PAIR_CONSTRAINT => {
            CoreError::Conflict(ConflictReason::DuplicateBooking)
        }
        other => other.into(),
    }
}
