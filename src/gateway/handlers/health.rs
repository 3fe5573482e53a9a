//! Health, liveness and info handlers

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use utoipa::ToSchema;

use super::super::state::{AppState, ServiceInfo};
use super::super::types::{ApiResponse, ApiResult, error_codes, ok};

/// Health check response data
#[derive(serde::Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

/// Health check endpoint
///
/// Pings the database. Does NOT expose the failure details in the response.
///
/// - Healthy: 200 OK + {code: 0, data: {status}}
/// - Unhealthy: 503 Service Unavailable
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Service unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                status: "ok".to_string(),
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "[HEALTH] database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    code: error_codes::SERVICE_UNAVAILABLE,
                    msg: "unavailable".to_string(),
                    data: None,
                }),
            )
        }
    }
}

/// Liveness check, no dependency checks
#[utoipa::path(
    get,
    path = "/live",
    responses((status = 200, description = "Process is alive", body = HealthResponse)),
    tag = "System"
)]
pub async fn live() -> ApiResult<HealthResponse> {
    ok(HealthResponse {
        status: "alive".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/info",
    responses((status = 200, description = "Build and runtime info", body = ServiceInfo)),
    tag = "System"
)]
pub async fn info(State(state): State<Arc<AppState>>) -> ApiResult<ServiceInfo> {
    ok(state.info.clone())
}
