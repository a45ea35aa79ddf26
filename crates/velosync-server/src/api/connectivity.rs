use axum::{extract::State, Extension, Json};
use serde::Serialize;
use velosync_resilience::{CircuitSnapshot, ConnectivitySample};
use velosync_sync::SyncOutcome;

use super::{sync::map_client_error, ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

#[derive(Debug, Serialize)]
pub struct ConnectivityBody {
    pub connectivity: ConnectivitySample,
    pub breaker: CircuitSnapshot,
}

/// `GET /api/connectivity`
pub async fn connectivity_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<ConnectivityBody>> {
    Json(ApiResponse::new(
        ConnectivityBody {
            connectivity: state.monitor.status(),
            breaker: state.breaker.status(),
        },
        &req_id,
    ))
}

#[derive(Debug, Serialize)]
pub struct AckBody {
    pub acknowledged: bool,
}

/// `POST /api/connectivity/reset`
///
/// Clears the rolling sample window and the consecutive-error streak. Does
/// not touch the circuit breaker.
pub async fn reset_connectivity(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<AckBody>> {
    state.monitor.reset();
    tracing::info!("connectivity metrics reset by operator");
    Json(ApiResponse::new(AckBody { acknowledged: true }, &req_id))
}

/// `POST /api/breaker/reset`
pub async fn reset_breaker(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<CircuitSnapshot>> {
    state.breaker.reset();
    tracing::info!("circuit breaker reset by operator");
    Json(ApiResponse::new(state.breaker.status(), &req_id))
}

/// `POST /api/emergency-stop`
pub async fn activate_emergency_stop(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<ConnectivitySample>> {
    state.monitor.activate_emergency_stop();
    tracing::warn!("emergency stop activated by operator");
    Json(ApiResponse::new(state.monitor.status(), &req_id))
}

/// `DELETE /api/emergency-stop`
pub async fn disable_emergency_stop(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<ConnectivitySample>> {
    state.monitor.disable_emergency_stop();
    tracing::info!("emergency stop disabled by operator");
    Json(ApiResponse::new(state.monitor.status(), &req_id))
}

#[derive(Debug, Serialize)]
pub struct NetworkRestoredBody {
    pub outcome: String,
}

/// `POST /api/network-restored`
///
/// Signals that upstream connectivity is believed to be back: half-opens an
/// open breaker and attempts one guarded sync pass.
pub async fn network_restored(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<NetworkRestoredBody>>, ApiError> {
    let outcome = state
        .orchestrator
        .notify_network_restored()
        .await
        .map_err(|err| map_client_error(&err, &req_id))?;

    let label = match outcome {
        SyncOutcome::Completed { .. } => "completed".to_string(),
        SyncOutcome::AlreadyRunning => "already_running".to_string(),
        SyncOutcome::Skipped(reason) => format!("skipped: {reason}"),
        SyncOutcome::Failed { error } => format!("failed: {error}"),
    };

    Ok(Json(ApiResponse::new(
        NetworkRestoredBody { outcome: label },
        &req_id,
    )))
}
