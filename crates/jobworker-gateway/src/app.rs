use axum::{
    routing::{get, put},
    Router,
};
use jobworker_core::config::WorkerConfig;
use jobworker_driver::Driver;
use std::sync::Arc;
use std::time::Instant;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: WorkerConfig,
    pub driver: Driver,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: WorkerConfig, driver: Driver) -> Self {
        Self {
            config,
            driver,
            started_at: Instant::now(),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/jobs", get(crate::http::jobs::list_jobs))
        .route("/jobs/{id}", get(crate::http::jobs::get_job))
        .route("/jobs/{id}/action", put(crate::http::jobs::job_action))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
