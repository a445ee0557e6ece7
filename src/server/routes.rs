//! Route definitions for the dashboard API.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the router with all API routes.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/:id/update", post(handlers::update_job))
        .route("/jobs/:id/delete", delete(handlers::delete_job))
        .route("/companies", get(handlers::companies))
        .route("/cv", post(handlers::upload_cv))
        .route("/cv/status", get(handlers::cv_status));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
