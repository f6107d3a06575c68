use axum::{
    http::{header, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod attendees;
pub mod bookings;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod state;

pub use error::AppError;
pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::USER_AGENT]);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::export))
        .route("/api/attendees", post(attendees::register).get(attendees::list))
        .route("/api/attendees/{id}", put(attendees::update))
        .route("/api/events", post(events::create).get(events::list))
        .route(
            "/api/events/{id}",
            get(events::get_one).put(events::update).delete(events::delete),
        )
        .route("/api/bookings", post(bookings::book))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
