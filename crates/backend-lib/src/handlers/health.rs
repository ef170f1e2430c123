// ============================
// crates/backend-lib/src/handlers/health.rs
// ============================
use axum::Json;
use boardsync_common::api::HealthResponse;
use chrono::Utc;

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}
