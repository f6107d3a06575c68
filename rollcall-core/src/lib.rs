pub mod locations;
pub mod models;
pub mod repository;
pub mod validation;

use std::fmt;

pub use locations::LocationWhitelist;
pub use models::{Attendee, Booking, Event, EventDraft, EventFilter, EventListing, Page, PageRequest, Pagination};
pub use repository::{AttendeeRepository, EventGuard, EventRepository, StoreError};
pub use validation::ValidationErrors;

/// Entity kinds that can be reported as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Event,
    Attendee,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Event => f.write_str("Event"),
            Resource::Attendee => f.write_str("Attendee"),
        }
    }
}

/// Why a write was refused even though the input itself was valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    EmailTaken,
    DuplicateBooking,
    EventFull,
}

impl ConflictReason {
    /// Stable machine-readable name, used in API bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            ConflictReason::EmailTaken => "EmailTaken",
            ConflictReason::DuplicateBooking => "DuplicateBooking",
            ConflictReason::EventFull => "EventFull",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::EmailTaken => f.write_str("Email already registered"),
            ConflictReason::DuplicateBooking => f.write_str("Duplicate booking not allowed"),
            ConflictReason::EventFull => f.write_str("Event is fully booked"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(ValidationErrors),
    /// The request body could not be decoded at all. Reported before any field checks.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("{0} not found")]
    NotFound(Resource),
    #[error("{0}")]
    Conflict(ConflictReason),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        CoreError::ValidationError(errors)
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy => {
                CoreError::Unavailable("Timed out waiting for the event to become available".to_string())
            }
            StoreError::PoolExhausted => {
                CoreError::Unavailable("Timed out waiting for a database connection".to_string())
            }
            other => CoreError::Storage(other),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
