use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

/// DELETE /api/sessions/{session}
///
/// Administrative override: clears the session's blocklist entry, warnings,
/// and every strategy counter it holds.
pub async fn reset_session(
    State(state): State<SharedState>,
    Path(session): Path<String>,
) -> Json<Value> {
    state.limiter.reset_session(&session);

    Json(json!({
        "status": "reset",
        "session": session
    }))
}
