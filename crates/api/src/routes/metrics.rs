use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::Encoder;

use crate::state::SharedState;

/// GET /api/metrics
///
/// Exposes the limiter's counters (total/blocked checks, suspicious flags,
/// per-category volume) in the Prometheus text exposition format.
pub async fn get_metrics(State(state): State<SharedState>) -> impl IntoResponse {
    let families = state.metrics.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = prometheus::TextEncoder::new().encode(&families, &mut buffer) {
        tracing::error!("failed to encode rate-limit metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("failed to encode metrics: {}", e),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        String::from_utf8(buffer).unwrap_or_default(),
    )
}
