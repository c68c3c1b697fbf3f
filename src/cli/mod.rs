//! Subcommand handlers. `main.rs` keeps the clap definitions; the work
//! happens here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::config::AppConfig;
use crate::gateway::{start_gateway, AppState};
use crate::knowledge::KeywordKnowledge;
use crate::logs::LogBroadcast;
use crate::session::SessionStore;
use crate::skills::SkillScanner;

/// How long shutdown waits for running turns.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

async fn build_agent(config: Arc<AppConfig>) -> anyhow::Result<Arc<Agent>> {
    let knowledge = Arc::new(KeywordKnowledge::new(&config.knowledge_dir));
    let passages = knowledge.initialize().await;
    info!(passages, "knowledge base loaded");
    Ok(Arc::new(Agent::from_config(config, knowledge)?))
}

// ── serve ───────────────────────────────────────────────────────────────────

/// Run the gateway until Ctrl-C, then drain running turns.
pub async fn serve(
    config: Arc<AppConfig>,
    logs: LogBroadcast,
    addr_override: Option<&str>,
) -> anyhow::Result<()> {
    let raw_addr = addr_override.unwrap_or(&config.server.addr);
    let addr: SocketAddr = raw_addr
        .parse()
        .with_context(|| format!("invalid listen address {raw_addr:?}"))?;

    if !config.model.is_configured() {
        warn!("no model configured; chat requests will report an error until one is set");
    }

    let agent = build_agent(Arc::clone(&config)).await?;
    if let Err(e) = agent.skills().refresh_snapshot().await {
        warn!(error = %e, "initial skills snapshot failed");
    }

    let shutdown = CancellationToken::new();
    let gateway = start_gateway(addr, AppState::new(Arc::clone(&agent), logs), shutdown.clone())
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!();
    println!("  mini-openclaw v{}", env!("CARGO_PKG_VERSION"));
    println!("  Root:     {}", config.root_dir.display());
    println!("  Model:    {}", display_or_unset(&config.model.model));
    println!("  Tools:    {}", agent.tools().list().len());
    println!("  Gateway:  http://{}", gateway.addr);
    println!();

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl-C, shutting down");
    shutdown.cancel();

    let in_flight = agent.in_flight();
    if in_flight > 0 {
        info!(in_flight, "waiting for running turns to finish");
    }
    agent.drain(DRAIN_TIMEOUT).await;

    if tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .is_err()
    {
        warn!("gateway did not stop within 5s");
    }
    Ok(())
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not configured)"
    } else {
        value
    }
}

// ── chat ────────────────────────────────────────────────────────────────────

/// Run one turn and print its public events as JSON lines.
pub async fn run_chat(config: Arc<AppConfig>, session_id: &str, message: &str) -> anyhow::Result<()> {
    if message.trim().is_empty() {
        anyhow::bail!("message must not be empty");
    }
    let agent = build_agent(config).await?;
    let mut events = agent.stream_chat(message, session_id);
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

// ── sessions / skills ───────────────────────────────────────────────────────

pub async fn list_sessions(config: &AppConfig) -> anyhow::Result<()> {
    let sessions = SessionStore::new(&config.sessions_dir).list().await?;
    if sessions.is_empty() {
        println!("No sessions in {}", config.sessions_dir.display());
        return Ok(());
    }
    for s in sessions {
        println!(
            "{:<40} {:>9} B  {}",
            s.id,
            s.size_bytes,
            s.updated_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        );
    }
    Ok(())
}

pub async fn refresh_skills(config: &AppConfig) -> anyhow::Result<()> {
    let scanner = SkillScanner::new(&config.skills_dir, &config.workspace_dir, &config.root_dir);
    let snapshot = scanner.refresh_snapshot().await?;
    println!("{snapshot}");
    println!("Wrote {}", scanner.snapshot_path().display());
    Ok(())
}

// ── status ──────────────────────────────────────────────────────────────────

/// Check a running gateway's health endpoint.
pub async fn check_status(base_url: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/health", base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()?;

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            println!("mini-openclaw is running at {base_url}");
        }
        Ok(resp) => {
            println!("mini-openclaw responded with status {}", resp.status());
        }
        Err(_) => {
            println!("mini-openclaw is not running (no response at {url})");
            println!("Start it with: mini-openclaw serve");
        }
    }
    Ok(())
}
