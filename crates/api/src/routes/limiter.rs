use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use vestguard_common::EndpointCategory;
use vestguard_rate_limit::{Decision, DenyReason};

use crate::state::SharedState;

/// Body of a check or record call.
#[derive(Debug, Deserialize)]
pub struct LimiterRequest {
    pub category: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// POST /api/check
///
/// Evaluate whether a call to the given endpoint category may proceed. This
/// never consumes budget; callers that go on to make the upstream call must
/// follow up with POST /api/record.
pub async fn check(
    State(state): State<SharedState>,
    Json(req): Json<LimiterRequest>,
) -> Json<Decision> {
    let decision = state
        .limiter
        .check(&req.category, req.session.as_deref(), req.payload.as_ref());

    let category = EndpointCategory::from_name(&req.category);
    state.metrics.checks_total.inc();
    state
        .metrics
        .category_checks
        .with_label_values(&[category.as_str()])
        .inc();
    if !decision.allowed {
        state.metrics.checks_blocked.inc();
        if decision.reason == Some(DenyReason::SuspiciousPattern) {
            state.metrics.suspicious_flags.inc();
        }
    }

    Json(decision)
}

/// POST /api/record
///
/// Commit one unit of consumption after the upstream call actually ran.
pub async fn record(
    State(state): State<SharedState>,
    Json(req): Json<LimiterRequest>,
) -> StatusCode {
    state.limiter.record(&req.category, req.session.as_deref());
    StatusCode::NO_CONTENT
}
