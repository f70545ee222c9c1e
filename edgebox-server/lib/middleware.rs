//! Request middleware.

use axum::{body::Body, http::Request, middleware::Next, response::Response};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Logs each request and the status it was answered with.
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    tracing::debug!("request: {} {}", method, uri);
    let response = next.run(req).await;
    tracing::info!("{} {}: {}", method, uri, response.status());

    response
}
