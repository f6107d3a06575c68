use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{opts, IntCounterVec, Registry, TextEncoder};
use rollcall_core::{Booking, ConflictReason, CoreError, CoreResult, Resource};

use crate::error::AppError;
use crate::state::AppState;

/// Counts admission decisions by outcome.
pub struct AdmissionMetrics {
    registry: Registry,
    outcomes: IntCounterVec,
}

impl AdmissionMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let outcomes = IntCounterVec::new(
            opts!("rollcall_admissions_total", "Booking requests by admission outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(outcomes.clone()))?;

        Ok(Self { registry, outcomes })
    }

    pub fn record(&self, result: &CoreResult<Booking>) {
        self.outcomes.with_label_values(&[outcome_label(result)]).inc();
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

fn outcome_label(result: &CoreResult<Booking>) -> &'static str {
    match result {
        Ok(_) => "admitted",
        Err(CoreError::Conflict(ConflictReason::DuplicateBooking)) => "duplicate_booking",
        Err(CoreError::Conflict(ConflictReason::EventFull)) => "event_full",
        Err(CoreError::Conflict(ConflictReason::EmailTaken)) => "conflict",
        Err(CoreError::NotFound(Resource::Event)) => "event_not_found",
        Err(CoreError::NotFound(Resource::Attendee)) => "attendee_not_found",
        Err(CoreError::ValidationError(_)) | Err(CoreError::MalformedPayload(_)) => "invalid",
        Err(CoreError::Unavailable(_)) => "unavailable",
        Err(CoreError::Storage(_)) => "error",
    }
}

pub async fn export(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .export()
        .map_err(|e| AppError::Anyhow(e.into()))?;

    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
