pub mod connectivity;
pub mod sync;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use velosync_resilience::{CircuitBreaker, ConnectivityMonitor};
use velosync_sync::SyncOrchestrator;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, ApiAuth, ApiRateLimit, RequestId,
};

/// Shared handler state: the sync engine plus the resilience components it
/// was wired with, exposed so operators can inspect and reset them.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub breaker: Arc<CircuitBreaker>,
    pub monitor: Arc<ConnectivityMonitor>,
}

/// Standard metadata attached to every API response.
#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMeta {
    fn new(request_id: &RequestId) -> Self {
        Self {
            request_id: request_id.0.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Success envelope: `{ "data": ..., "meta": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, request_id: &RequestId) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

/// Error envelope: `{ "error": { "code", "message" }, "meta": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: &str, message: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id),
        }
    }

    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "invalid_request" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "emergency_stop" | "circuit_open" => StatusCode::SERVICE_UNAVAILABLE,
            "upstream_auth" | "upstream_unavailable" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health(
    Extension(req_id): Extension<RequestId>,
) -> (StatusCode, Json<ApiResponse<HealthBody>>) {
    (
        StatusCode::OK,
        Json(ApiResponse::new(HealthBody { status: "ok" }, &req_id)),
    )
}

fn protected_router(state: AppState, auth: ApiAuth, rate_limit: ApiRateLimit) -> Router {
    Router::new()
        .route("/api/sync/status", get(sync::sync_status))
        .route("/api/sync/force", post(sync::force_sync))
        .route("/api/connectivity", get(connectivity::connectivity_status))
        .route(
            "/api/connectivity/reset",
            post(connectivity::reset_connectivity),
        )
        .route("/api/breaker/reset", post(connectivity::reset_breaker))
        .route(
            "/api/emergency-stop",
            post(connectivity::activate_emergency_stop)
                .delete(connectivity::disable_emergency_stop),
        )
        .route(
            "/api/network-restored",
            post(connectivity::network_restored),
        )
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(rate_limit, enforce_rate_limit))
                .layer(from_fn_with_state(auth, require_bearer_auth)),
        )
        .with_state(state)
}

/// Builds the full application router with middleware layers applied.
pub fn build_app(state: AppState, auth: ApiAuth, rate_limit: ApiRateLimit) -> Router {
    let public = Router::new().route("/healthz", get(health));

    public
        .merge(protected_router(state, auth, rate_limit))
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id))
}
