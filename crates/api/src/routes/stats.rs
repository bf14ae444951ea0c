use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

/// GET /api/stats
///
/// Returns aggregated limiter statistics plus server uptime.
pub async fn get_stats(State(state): State<SharedState>) -> Json<Value> {
    let uptime_secs = state.start_time.elapsed().as_secs();
    let stats = state.limiter.stats();

    Json(json!({
        "total_requests": stats.total_requests,
        "blocked_requests": stats.blocked_requests,
        "blocked_session_count": stats.blocked_session_count,
        "top_endpoints": stats.top_endpoints,
        "recent_activity": stats.recent_activity,
        "uptime_secs": uptime_secs
    }))
}
