use axum::{extract::State, Json};
use jobworker_driver::JobState;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let jobs = state.driver.jobs();
    let running = jobs
        .iter()
        .filter(|job| job.state == JobState::Running)
        .count();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("JOBWORKER_GIT_SHA"),
        "root": state.config.driver.root,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "jobs": jobs.len(),
        "running": running,
    }))
}
