use axum::{response::IntoResponse, Json};

/// `GET /api/health`
pub(crate) async fn api_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
