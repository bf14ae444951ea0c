pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use vestguard_common::AppConfig;
use vestguard_rate_limit::RateLimitService;

use crate::state::SharedState;

pub use state::{AppState, LimiterMetrics, SharedState as SharedStateType};

/// Build the Axum router with all service and admin routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/api/health", get(routes::health::health_check))
        // Prometheus metrics
        .route("/api/metrics", get(routes::metrics::get_metrics))
        // Rate limiting: evaluate, then commit
        .route("/api/check", post(routes::limiter::check))
        .route("/api/record", post(routes::limiter::record))
        // Limiter statistics
        .route("/api/stats", get(routes::stats::get_stats))
        // Administrative session reset
        .route(
            "/api/sessions/{session}",
            delete(routes::sessions::reset_session),
        )
        // Attach shared state and middleware
        .with_state(state)
        .layer(cors)
}

/// Start the API server on the specified address.
///
/// This function will block until the server is shut down.
pub async fn run_server(state: SharedState, listen_addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("API server listening on {}", listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Convenience function to create a SharedState from config plus a limiter.
pub fn new_shared_state(config: AppConfig, limiter: RateLimitService) -> SharedState {
    Arc::new(AppState::new(config, limiter))
}
