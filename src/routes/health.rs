use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use crate::server::AppState;

/// Health check endpoint handler.
///
/// Lightweight liveness probe for load balancers and uptime monitors. Also
/// reports the upstream request queue counters, which makes a stuck or
/// retry-heavy queue visible without digging through logs.
///
/// # Route
/// - **Method**: GET
/// - **Path**: `/ping`
///
/// # Response Format
/// ```json
/// {
///   "status": "pong",
///   "queue": { "pending": 0, "draining": false, "completed": 12, "failed": 0, "retries": 1, "abandoned": 0 }
/// }
/// ```
///
/// # Examples
/// ```bash
/// curl http://localhost:3000/ping
/// ```
pub async fn ping(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "pong", "queue": state.okx.queue().stats() }))
}
