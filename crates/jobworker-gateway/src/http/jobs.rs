//! Job status and operator actions.
//!
//! `GET /jobs` and `GET /jobs/{id}` return driver snapshots.
//! `PUT /jobs/{id}/action` takes `{"action": "start" | "stop"}` and answers
//! 202 once the driver has accepted the request.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jobworker_core::WorkerError;
use jobworker_driver::{DriverError, JobAction, JobSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct ActionRequest {
    pub action: String,
}

#[derive(Serialize)]
pub struct ActionResponse {
    pub job_id: String,
    pub action: JobAction,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Driver failures rendered as JSON with a matching status code.
pub struct ApiError(WorkerError);

impl From<DriverError> for ApiError {
    fn from(err: DriverError) -> Self {
        ApiError(match err {
            DriverError::JobNotFound(id) => WorkerError::JobNotFound { id },
            DriverError::UnknownAction(action) => WorkerError::InvalidAction { action },
            other => WorkerError::Internal(other.to_string()),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            WorkerError::JobNotFound { .. } => StatusCode::NOT_FOUND,
            WorkerError::InvalidAction { .. } | WorkerError::Definition(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

/// GET /jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSnapshot>> {
    Json(state.driver.jobs())
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    state
        .driver
        .job(&id)
        .map(Json)
        .ok_or_else(|| DriverError::JobNotFound(id).into())
}

/// PUT /jobs/{id}/action
pub async fn job_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ActionRequest>,
) -> Result<(StatusCode, Json<ActionResponse>), ApiError> {
    let action: JobAction = req.action.parse()?;
    if let Err(e) = state.driver.action(&id, action).await {
        warn!(job_id = %id, %action, error = %e, "job action rejected");
        return Err(e.into());
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(ActionResponse { job_id: id, action }),
    ))
}
