use crate::state::DashboardState;
use axum::routing::get;
use axum::Router;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<RwLock<DashboardState>>) -> Router {
    Router::new()
        .route("/api/logs", get(handlers::get_logs))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/occupancy", get(handlers::get_occupancy))
        .with_state(state)
}
