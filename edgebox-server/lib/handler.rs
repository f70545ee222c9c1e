//! Request handlers of the local API.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{
    payload::{RegularMessageResponse, StopQuery},
    state::AppState,
    ServerResult,
};

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

/// Handler for health check
pub async fn health() -> ServerResult<impl IntoResponse> {
    Ok((
        StatusCode::OK,
        Json(RegularMessageResponse {
            message: "Service is healthy".to_string(),
        }),
    ))
}

/// Lists all containers, oldest first.
pub async fn list_containers(State(state): State<AppState>) -> ServerResult<impl IntoResponse> {
    Ok(Json(state.get_containers().list().await))
}

/// Returns one container.
pub async fn get_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    Ok(Json(state.get_containers().get(&id).await?))
}

/// Returns the network byte counters of a running container.
pub async fn container_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    Ok(Json(state.get_containers().metrics(&id).await?))
}

/// Starts a container and returns its new state.
pub async fn start_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    tracing::info!("starting container {id}");
    Ok(Json(state.get_containers().start(&id).await?))
}

/// Stops a container and returns its new state.
pub async fn stop_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StopQuery>,
) -> ServerResult<impl IntoResponse> {
    tracing::info!("stopping container {id}");
    let timeout = query.timeout.map(Duration::from_secs);
    Ok(Json(state.get_containers().stop(&id, timeout).await?))
}
