use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::{
    middleware::{make_span_with_request_id, request_id_middleware},
    services::{stats::StatsSnapshot, Recommender},
};

pub mod recommendations;

/// Shared, read-only state handed to every handler
pub struct AppState {
    pub recommender: Recommender,
    /// `k` used when a request does not specify one
    pub default_k: usize,
}

impl AppState {
    pub fn new(recommender: Recommender, default_k: usize) -> Self {
        Self {
            recommender,
            default_k,
        }
    }
}

/// Creates the application router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route(
            "/recommendations",
            get(recommendations::blended).post(recommendations::blended),
        )
        .route(
            "/recommendations_offline",
            get(recommendations::offline).post(recommendations::offline),
        )
        .route(
            "/recommendations_online",
            get(recommendations::online).post(recommendations::online),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(axum::middleware::from_fn(request_id_middleware))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Request counters since startup
async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.recommender.stats().snapshot())
}
