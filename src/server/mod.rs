//! HTTP API and WebSocket subscriber endpoint

pub mod routes;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::monitor::Monitor;
use crate::notify::Hub;
use crate::store::Store;

/// State shared across handlers
pub struct AppState {
    pub store: Arc<Store>,
    pub hub: Arc<Hub>,
    pub monitor: Arc<Monitor>,
}

pub type SharedState = Arc<AppState>;

/// Create the API router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // Group registration and dashboard
        .route("/api/groups", post(routes::register_group))
        .route("/api/groups/:id", get(routes::group_dashboard))
        .route("/api/groups/:id/violations", get(routes::group_violations))
        .route("/api/groups/:id/scan", post(routes::trigger_scan))
        .route("/api/groups/:id/disband", post(routes::disband_group))
        // Violation status transitions (driven by the external ledger operator)
        .route("/api/violations/:id/approve", post(routes::approve_violation))
        .route("/api/violations/:id/applied", post(routes::apply_violation))
        // Rule lifecycle
        .route("/api/rules/:id/deactivate", post(routes::deactivate_rule))
        // Real-time subscriber channel
        .route("/ws", get(ws::ws_handler))
        // Health check
        .route("/health", get(routes::health))
        .with_state(state)
}
