use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rollcall_core::CoreError;
use serde_json::{json, Value};

#[derive(Debug)]
pub enum AppError {
    Core(CoreError),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Core(CoreError::ValidationError(errors)) => {
                (StatusCode::BAD_REQUEST, json!({ "errors": errors }))
            }
            AppError::Core(CoreError::MalformedPayload(msg)) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            AppError::Core(err @ CoreError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
            }
            AppError::Core(CoreError::Conflict(reason)) => (
                StatusCode::CONFLICT,
                json!({ "error": reason.to_string(), "reason": reason.code() }),
            ),
            AppError::Core(CoreError::Unavailable(msg)) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg }))
            }
            AppError::Core(CoreError::Storage(err)) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

/// A JSON request body decoded without regard to `Content-Type`.
///
/// Any body that is not valid JSON is rejected as `Invalid JSON` before a handler
/// looks at individual fields.
pub struct JsonBody(pub Value);

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| CoreError::MalformedPayload(e.body_text()))?;

        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|_| CoreError::MalformedPayload("Invalid JSON".to_string()).into())
    }
}

/// A numeric `{id}` path segment. Anything else is rejected with a JSON error body.
pub struct IdPath(pub i64);

impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<i64>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| IdPath(id))
            .map_err(|_| CoreError::MalformedPayload("Invalid id".to_string()).into())
    }
}
