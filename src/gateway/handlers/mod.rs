pub(crate) mod chat;
pub(crate) mod files;
pub(crate) mod health;
pub(crate) mod sessions;

use axum::{http::StatusCode, Json};
use serde_json::Value;

/// `(status, {"error": message})`, the shape every handler fails with.
pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
}
