use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::warn;

use super::{api_error, ApiError};
use crate::files::FileError;
use crate::gateway::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct FileQuery {
    path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileWrite {
    path: String,
    content: String,
}

fn file_error(e: FileError) -> ApiError {
    let status = match &e {
        e if e.is_rejected_path() => StatusCode::BAD_REQUEST,
        FileError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            warn!(error = %e, "file API I/O failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e)
}

/// `GET /api/files?path=…`
pub(crate) async fn api_file_get(
    State(state): State<AppState>,
    Query(q): Query<FileQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state.files.read_text(&q.path).await.map_err(file_error)?;
    Ok(Json(serde_json::json!({ "path": q.path, "content": content })))
}

/// `POST /api/files`
pub(crate) async fn api_file_put(
    State(state): State<AppState>,
    Json(body): Json<FileWrite>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .files
        .write_text(&body.path, &body.content)
        .await
        .map_err(file_error)?;
    Ok(Json(serde_json::json!({ "ok": true, "path": body.path })))
}
