//! Prometheus scrape endpoint

use super::{errors::ApiError, handlers::AppState, middleware::RequestId};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::Arc;

/// GET /metrics
pub async fn metrics_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let body = state
        .service
        .metrics()
        .render()
        .map_err(|e| ApiError::internal_error(request_id.0, format!("Failed to render metrics: {}", e)))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response())
}
