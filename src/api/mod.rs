//! REST API endpoints.
//!
//! Axum-based read-only HTTP API over the published statistics.

pub mod routes;
pub mod state;

use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::state::AppState;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// CORS for the dashboard. `*` allows any origin.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, ApiError> {
    if origin == "*" {
        return Ok(CorsLayer::permissive());
    }
    let origin = origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid CORS origin {}: {}", origin, e)))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET]))
}

pub fn build_router(state: AppState) -> Router {
    use routes::stats;

    Router::new()
        .route("/api/health", get(stats::health))
        .route("/api/stats/win-rates", get(stats::win_rates))
        .route("/api/stats/star-rates", get(stats::star_rates))
        .route("/api/stats/rank-match-counts", get(stats::rank_match_counts))
        .route("/api/stats/pairs/:kind/:partition", get(stats::pair_stats))
        .route("/api/stats/trios/:partition", get(stats::trio_stats))
        .route(
            "/api/stats/three-vs-three/:partition",
            get(stats::three_vs_three_stats),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_body_shape() {
        let resp = ApiError::NotFound("trio_stats/1.json".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["message"], "Not found: trio_stats/1.json");
    }

    #[test]
    fn test_cors_layer_origins() {
        assert!(cors_layer("*").is_ok());
        assert!(cors_layer("https://stats.example.com").is_ok());
        assert!(matches!(
            cors_layer("bad\norigin"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
