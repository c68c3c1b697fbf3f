use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde::Deserialize;
use tokio_stream::StreamExt as _;

use super::api_error;
use crate::agent::PublicEvent;
use crate::gateway::AppState;
use crate::session::DEFAULT_SESSION_ID;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    message: String,
    #[serde(default = "default_session_id")]
    session_id: String,
    #[serde(default = "default_stream")]
    stream: bool,
}

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

fn default_stream() -> bool {
    true
}

/// `POST /api/chat`
///
/// Streams one `event: <type>` SSE frame per public event, or with
/// `stream: false` waits for the turn and returns `{"events": [...]}`.
pub(crate) async fn api_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if req.message.trim().is_empty() {
        return api_error(StatusCode::UNPROCESSABLE_ENTITY, "message must not be empty")
            .into_response();
    }

    let events = state.agent.stream_chat(req.message, &req.session_id);
    if req.stream {
        let frames = events.map(|ev| Event::default().event(ev.kind()).json_data(&ev));
        return Sse::new(frames)
            .keep_alive(KeepAlive::default())
            .into_response();
    }

    let events: Vec<PublicEvent> = events.collect().await;
    Json(serde_json::json!({ "events": events })).into_response()
}
