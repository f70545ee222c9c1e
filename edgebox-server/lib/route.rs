//! Router of the local API.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{handler, middleware as app_middleware, state::AppState};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Create a new router with the given state
pub fn create_router(state: AppState) -> Router {
    let rest_api = Router::new()
        .route("/health", get(handler::health))
        .route("/containers", get(handler::list_containers))
        .route("/containers/{id}", get(handler::get_container))
        .route("/containers/{id}/metrics", get(handler::container_metrics))
        .route("/containers/{id}/start", post(handler::start_container))
        .route("/containers/{id}/stop", post(handler::stop_container));

    Router::new()
        .nest("/api/v1", rest_api)
        .layer(middleware::from_fn(app_middleware::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
