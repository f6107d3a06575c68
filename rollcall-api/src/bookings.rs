use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use rollcall_booking::BookingRequest;
use serde_json::json;

use crate::error::{AppError, JsonBody};
use crate::state::AppState;

pub async fn book(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody,
) -> Result<impl IntoResponse, AppError> {
    let result = match BookingRequest::from_json(&payload) {
        Ok(request) => state.admission.book(request).await,
        Err(err) => Err(err),
    };
    state.metrics.record(&result);
    let booking = result?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Booking successful",
            "booking_id": booking.id,
        })),
    ))
}
