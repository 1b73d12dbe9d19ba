//! HTTP endpoints
//!
//! - `POST /api/plans/start` and `POST /api/plans/continue` answer with an
//!   SSE stream of turn events, or a single `error` frame and a 4xx/5xx
//!   status when the request is rejected up front
//! - `GET /api/plans/{id}` returns the plan and its transcript
//! - `GET /health`

mod error;
mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::controller::PlanController;

pub use error::ApiError;
pub use handlers::PlanView;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PlanController>,
}

impl AppState {
    pub fn new(controller: PlanController) -> Self {
        Self {
            controller: Arc::new(controller),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/plans/start", post(handlers::start_plan))
        .route("/api/plans/continue", post(handlers::continue_plan))
        .route("/api/plans/{id}", get(handlers::get_plan))
        .route("/health", get(handlers::health))
        .with_state(state)
}
