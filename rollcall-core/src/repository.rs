use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Attendee, Booking, Event, EventDraft, EventFilter, EventListing, PageRequest};

/// Failures reported by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The per-event serialization point could not be acquired within the allowed wait.
    #[error("Timed out waiting for a lock")]
    Busy,
    /// No pooled database connection became free in time.
    #[error("Timed out waiting for a database connection")]
    PoolExhausted,
    /// A store-level uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    Duplicate { constraint: String },
    #[error("Database error: {0}")]
    Database(String),
}

pub const ATTENDEE_EMAIL_CONSTRAINT: &str = "attendees_email_key";
pub const BOOKING_PAIR_CONSTRAINT: &str = "bookings_event_id_attendee_id_key";

/// Repository trait for attendee records
#[async_trait]
pub trait AttendeeRepository: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the email is already stored.
    async fn insert_attendee(&self, name: &str, email: &str) -> Result<Attendee, StoreError>;

    /// Returns `None` if no attendee has this id.
    async fn update_attendee(
        &self,
        id: i64,
        name: &str,
        email: &str,
    ) -> Result<Option<Attendee>, StoreError>;

    async fn find_attendee(&self, id: i64) -> Result<Option<Attendee>, StoreError>;

    async fn find_attendee_by_email(&self, email: &str) -> Result<Option<Attendee>, StoreError>;

    /// All attendees in ascending id order.
    async fn list_attendees(&self) -> Result<Vec<Attendee>, StoreError>;
}

/// Repository trait for events and the bookings that depend on them
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert_event(&self, draft: &EventDraft) -> Result<Event, StoreError>;

    async fn find_event(&self, id: i64) -> Result<Option<Event>, StoreError>;

    /// One page of matching events ordered by `(starts_at, id)`, plus the total number
    /// of matches before pagination.
    async fn list_events(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<(Vec<EventListing>, u64), StoreError>;

    /// Live booking count for an event. Never served from a cache.
    async fn count_bookings(&self, event_id: i64) -> Result<i64, StoreError>;

    /// Acquires the serialization point for one event, waiting at most `wait`.
    ///
    /// Returns `Ok(None)` if the event does not exist, and [`StoreError::Busy`] if the
    /// wait elapsed. All booking writes and event mutations for this event go through
    /// the returned guard; dropping it without calling [`EventGuard::commit`] discards
    /// everything staged on it.
    async fn lock_event(
        &self,
        id: i64,
        wait: Duration,
    ) -> Result<Option<Box<dyn EventGuard>>, StoreError>;
}

/// Exclusive access to one event for the lifetime of the guard.
///
/// Reads made through the guard observe its own staged writes, and no other guard for
/// the same event can exist at the same time.
#[async_trait]
pub trait EventGuard: Send {
    /// The event as seen through this guard, including a staged [`EventGuard::save_event`].
    fn event(&self) -> &Event;

    async fn attendee_exists(&mut self, attendee_id: i64) -> Result<bool, StoreError>;

    async fn has_booking(&mut self, attendee_id: i64) -> Result<bool, StoreError>;

    async fn booked_count(&mut self) -> Result<i64, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the `(event, attendee)` pair exists.
    async fn insert_booking(
        &mut self,
        attendee_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Booking, StoreError>;

    async fn save_event(&mut self, event: &Event) -> Result<(), StoreError>;

    /// Deletes the event and every booking that references it, returning how many
    /// bookings went with it.
    async fn delete_event(&mut self) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
