use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rollcall_core::validation::event_filter;
use rollcall_core::CoreError;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, IdPath, JsonBody};
use crate::state::AppState;

/// Raw listing query. Numbers stay strings here so that junk falls back to defaults
/// instead of failing the whole request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn lenient_int(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse().ok())
}

pub async fn create(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody,
) -> Result<impl IntoResponse, AppError> {
    let event = state.events.create(&payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": event.id,
            "message": "Event created successfully",
        })),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = event_filter(
        params.location.as_deref(),
        params.title.as_deref(),
        params.start_date.as_deref(),
        params.end_date.as_deref(),
    )
    .map_err(CoreError::from)?;

    let page = state
        .events
        .list(
            &filter,
            lenient_int(params.page.as_deref()),
            lenient_int(params.limit.as_deref()),
        )
        .await?;

    Ok(Json(page))
}

pub async fn get_one(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.events.get(id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    JsonBody(payload): JsonBody,
) -> Result<impl IntoResponse, AppError> {
    state.events.update(id, &payload).await?;
    Ok(Json(json!({ "message": "Event updated successfully" })))
}

pub async fn delete(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<impl IntoResponse, AppError> {
    state.events.delete(id).await?;
    Ok(Json(json!({ "message": "Event deleted successfully" })))
}
