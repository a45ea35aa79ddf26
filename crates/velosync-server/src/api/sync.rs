use axum::{extract::State, Extension, Json};
use serde::Serialize;
use velosync_client::ClientError;
use velosync_core::SyncStatus;
use velosync_sync::SyncOutcome;

use super::{ApiError, ApiResponse, AppState};
use crate::middleware::RequestId;

/// `GET /api/sync/status`
pub async fn sync_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<SyncStatus>> {
    Json(ApiResponse::new(state.orchestrator.status(), &req_id))
}

#[derive(Debug, Serialize)]
pub struct ForceSyncBody {
    pub outcome: String,
    pub products: usize,
    pub variations: usize,
}

/// `POST /api/sync/force`
///
/// Runs a full refresh pass, waiting out any in-flight sync; the cache is
/// only replaced once the pass commits.
/// Unlike scheduled passes, upstream failures surface to the caller.
pub async fn force_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<ForceSyncBody>>, ApiError> {
    let outcome = state
        .orchestrator
        .force_sync()
        .await
        .map_err(|err| map_client_error(&err, &req_id))?;

    let body = match outcome {
        SyncOutcome::Completed {
            products,
            variations,
        } => ForceSyncBody {
            outcome: "completed".to_string(),
            products,
            variations,
        },
        SyncOutcome::Skipped(reason) => ForceSyncBody {
            outcome: format!("skipped: {reason}"),
            products: 0,
            variations: 0,
        },
        SyncOutcome::AlreadyRunning => ForceSyncBody {
            outcome: "already_running".to_string(),
            products: 0,
            variations: 0,
        },
        SyncOutcome::Failed { error } => {
            return Err(ApiError::new("upstream_unavailable", error, &req_id));
        }
    };

    Ok(Json(ApiResponse::new(body, &req_id)))
}

pub(super) fn map_client_error(err: &ClientError, req_id: &RequestId) -> ApiError {
    let code = match err {
        ClientError::EmergencyStop => "emergency_stop",
        ClientError::CircuitOpen => "circuit_open",
        ClientError::RateLimited => "rate_limited",
        ClientError::Auth { .. } => "upstream_auth",
        _ if err.is_network_class() => "upstream_unavailable",
        _ => "internal_error",
    };

    ApiError::new(code, err.to_string(), req_id)
}
