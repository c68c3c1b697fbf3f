use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::{api_error, ApiError};
use crate::gateway::AppState;
use crate::session::normalize_session_id;

/// `GET /api/sessions`
pub(crate) async fn api_sessions_list(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state
        .agent
        .sessions()
        .list()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

/// `GET /api/sessions/:session_id`
pub(crate) async fn api_session_get(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let id = normalize_session_id(&session_id);
    let entries = state.agent.sessions().load(&id).await;
    Json(serde_json::json!({ "session_id": id, "entries": entries }))
}

/// `DELETE /api/sessions/:session_id`
pub(crate) async fn api_session_delete(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = normalize_session_id(&session_id);
    let deleted = state
        .agent
        .sessions()
        .delete(&id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    Ok(Json(serde_json::json!({ "session_id": id, "deleted": deleted })))
}
