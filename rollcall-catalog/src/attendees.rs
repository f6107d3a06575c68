use std::sync::Arc;

use rollcall_core::repository::ATTENDEE_EMAIL_CONSTRAINT;
use rollcall_core::validation::attendee_input;
use rollcall_core::{Attendee, AttendeeRepository, ConflictReason, CoreError, CoreResult, Resource, StoreError};
use rollcall_shared::Masked;
use serde_json::Value;
use tracing::{info, warn};

/// Registration and profile updates for attendees.
///
/// The email pre-check gives the common case a clean conflict; the unique constraint in
/// the store settles the race between two registrations of the same address.
#[derive(Clone)]
pub struct AttendeeRegistry {
    attendees: Arc<dyn AttendeeRepository>,
}

impl AttendeeRegistry {
    pub fn new(attendees: Arc<dyn AttendeeRepository>) -> Self {
        Self { attendees }
    }

    pub async fn register(&self, payload: &Value) -> CoreResult<Attendee> {
        let input = attendee_input(payload)?;

        if self.attendees.find_attendee_by_email(&input.email).await?.is_some() {
            warn!("Registration rejected, email taken: {}", Masked(&input.email));
            return Err(CoreError::Conflict(ConflictReason::EmailTaken));
        }

        let attendee = self
            .attendees
            .insert_attendee(&input.name, &input.email)
            .await
            .map_err(email_conflict)?;

        info!("Registered attendee {} ({})", attendee.id, Masked(&attendee.email));
        Ok(attendee)
    }

    /// Replaces name and email. Keeping one's own email is not a conflict.
    pub async fn update(&self, id: i64, payload: &Value) -> CoreResult<Attendee> {
        let input = attendee_input(payload)?;

        if self.attendees.find_attendee(id).await?.is_none() {
            return Err(CoreError::NotFound(Resource::Attendee));
        }
        if let Some(owner) = self.attendees.find_attendee_by_email(&input.email).await? {
            if owner.id != id {
                return Err(CoreError::Conflict(ConflictReason::EmailTaken));
            }
        }

        let attendee = self
            .attendees
            .update_attendee(id, &input.name, &input.email)
            .await
            .map_err(email_conflict)?
            .ok_or(CoreError::NotFound(Resource::Attendee))?;

        info!("Updated attendee {}", attendee.id);
        Ok(attendee)
    }

    pub async fn list(&self) -> CoreResult<Vec<Attendee>> {
        Ok(self.attendees.list_attendees().await?)
    }
}

fn email_conflict(err: StoreError) -> CoreError {
    match err {
        StoreError::Duplicate { ref constraint } if constraint == ATTENDEE_EMAIL_CONSTRAINT => {
            CoreError::Conflict(ConflictReason::EmailTaken)
        }
        other => other.into(),
    }
}
