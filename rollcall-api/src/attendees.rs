use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::error::{AppError, IdPath, JsonBody};
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody,
) -> Result<impl IntoResponse, AppError> {
    let attendee = state.attendees.register(&payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": attendee.id,
            "message": "Attendee registered successfully",
        })),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    JsonBody(payload): JsonBody,
) -> Result<impl IntoResponse, AppError> {
    let attendee = state.attendees.update(id, &payload).await?;

    Ok(Json(json!({
        "id": attendee.id,
        "message": "Attendee updated successfully",
    })))
}

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.attendees.list().await?))
}
