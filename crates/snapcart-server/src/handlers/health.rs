//! Health check handler

use axum::Json;
use serde_json::{json, Value};

/// GET /api/health - Liveness check
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
