//! HTTP + WebSocket gateway.
//!
//! Serves:
//! - `GET  /api/health`          liveness, never authenticated
//! - `POST /api/chat`            one agent turn, SSE or buffered
//! - `GET  /api/files?path=`     sandboxed read
//! - `POST /api/files`           sandboxed write
//! - `GET  /api/sessions`        session summaries
//! - `GET|DELETE /api/sessions/:session_id`
//! - `GET  /ws/logs`             live JSON log lines
//!
//! When an API token is configured every other `/api` route requires it.

mod auth;
mod handlers;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::files::FileService;
use crate::logs::LogBroadcast;

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub(crate) agent: Arc<Agent>,
    pub(crate) files: FileService,
    pub(crate) logs: LogBroadcast,
    pub(crate) api_token: Option<String>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>, logs: LogBroadcast) -> Self {
        let files = FileService::new(&agent.config().root_dir);
        let api_token = agent.config().api_token.clone();
        Self {
            agent,
            files,
            logs,
            api_token,
        }
    }
}

/// Handle returned by [`start_gateway`].
pub struct Gateway {
    /// The address the server is actually listening on.
    pub addr: SocketAddr,
    /// Server task; completes after shutdown is requested.
    pub handle: JoinHandle<()>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/chat", post(handlers::chat::api_chat))
        .route(
            "/files",
            get(handlers::files::api_file_get).post(handlers::files::api_file_put),
        )
        .route("/sessions", get(handlers::sessions::api_sessions_list))
        .route(
            "/sessions/:session_id",
            get(handlers::sessions::api_session_get).delete(handlers::sessions::api_session_delete),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let api = Router::new()
        .route("/health", get(handlers::health::api_health))
        .merge(protected);

    Router::new()
        .nest("/api", api)
        .route("/ws/logs", get(ws::ws_logs_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn start_gateway(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<Gateway> {
    if state.api_token.is_some() {
        info!("API authentication enabled (MINI_OPENCLAW_API_TOKEN set)");
    } else {
        warn!("API authentication disabled (MINI_OPENCLAW_API_TOKEN not set)");
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!("gateway server error: {e}");
        }
    });

    info!(%bound_addr, "gateway started");
    Ok(Gateway {
        addr: bound_addr,
        handle,
    })
}
