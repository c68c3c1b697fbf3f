//! Conversation orchestrator.
//!
//! One call to [`Agent::stream_chat`] is one turn: it prepares the system
//! prompt and history, drives the [`ReasoningEngine`], turns its raw events
//! into [`PublicEvent`]s, and records the turn in the session log with a
//! single append once the engine stream ends.

pub mod correlator;
pub mod events;
pub mod normalizer;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;
use tracing::{debug, error, info, info_span, warn, Instrument as _};

use crate::config::AppConfig;
use crate::knowledge::KnowledgeBase;
use crate::models::{EngineModel, EngineRequest, OpenAiEngine, ReasoningEngine};
use crate::prompt::PromptBuilder;
use crate::session::{normalize_session_id, SessionEntry, SessionStore};
use crate::skills::SkillScanner;
use crate::tools::{ToolContext, ToolRegistry};

pub use events::PublicEvent;
use normalizer::{EventNormalizer, Normalized};

/// First advisory thought of every configured turn.
pub const LOADED_THOUGHT: &str = "Loaded skill snapshot and system prompt; starting.";

/// Final answer used when the engine finishes without one.
pub const FALLBACK_FINAL: &str = "No final reply was generated.";

pub const MISSING_MODEL_CONFIG: &str =
    "Model config is missing. Set OPENAI_MODEL / OPENAI_API_KEY or configure a KEY.md provider.";

/// Public events buffered between the turn task and its consumer.
const EVENT_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// In-flight tracking
// ---------------------------------------------------------------------------

/// Counts a turn as running until dropped.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Event forwarding
// ---------------------------------------------------------------------------

/// Forwards public events to the caller until the caller goes away.
///
/// A closed receiver only stops forwarding. The turn keeps consuming the
/// engine so the session still gets its entries.
struct EventSink {
    tx: mpsc::Sender<PublicEvent>,
    connected: bool,
}

impl EventSink {
    fn new(tx: mpsc::Sender<PublicEvent>) -> Self {
        Self {
            tx,
            connected: true,
        }
    }

    async fn emit(&mut self, event: PublicEvent) {
        if !self.connected {
            return;
        }
        if self.tx.send(event).await.is_err() {
            self.connected = false;
            debug!("client disconnected, turn continues without forwarding");
        }
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

pub struct Agent {
    config: Arc<AppConfig>,
    engine: Arc<dyn ReasoningEngine>,
    tools: Arc<ToolRegistry>,
    sessions: SessionStore,
    skills: SkillScanner,
    prompt: PromptBuilder,
    in_flight: Arc<AtomicUsize>,
}

impl Agent {
    pub fn new(
        config: Arc<AppConfig>,
        engine: Arc<dyn ReasoningEngine>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(&config.sessions_dir),
            skills: SkillScanner::new(&config.skills_dir, &config.workspace_dir, &config.root_dir),
            prompt: PromptBuilder::new(&config.workspace_dir, &config.memory_file),
            config,
            engine,
            tools,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Production wiring: core tools plus the OpenAI-compatible engine.
    pub fn from_config(
        config: Arc<AppConfig>,
        knowledge: Arc<dyn KnowledgeBase>,
    ) -> anyhow::Result<Self> {
        let ctx = ToolContext::new(config.root_dir.clone(), knowledge)?;
        let tools = Arc::new(ToolRegistry::core(&ctx));
        let engine = Arc::new(OpenAiEngine::new(config.server.max_tool_iterations)?);
        Ok(Self::new(config, engine, tools))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn skills(&self) -> &SkillScanner {
        &self.skills
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Number of turns currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Wait for running turns to finish, polling every 100ms. Returns after
    /// `timeout` even if turns remain.
    pub async fn drain(&self, timeout: Duration) {
        let start = std::time::Instant::now();
        loop {
            let remaining = self.in_flight();
            if remaining == 0 {
                break;
            }
            if start.elapsed() >= timeout {
                warn!(remaining, "shutdown drain timeout reached, proceeding");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Start a turn in the background and return its public events.
    ///
    /// Dropping the stream does not cancel the turn.
    pub fn stream_chat(
        self: &Arc<Self>,
        message: impl Into<String>,
        session_id: &str,
    ) -> ReceiverStream<PublicEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let agent = Arc::clone(self);
        let message = message.into();
        let session = normalize_session_id(session_id);
        let guard = InFlightGuard::enter(Arc::clone(&self.in_flight));
        let span = info_span!("turn", session = %session);

        tokio::spawn(
            async move {
                let _guard = guard;
                agent.run_turn(message, session, EventSink::new(tx)).await;
            }
            .instrument(span),
        );
        ReceiverStream::new(rx)
    }

    /// Run a turn to completion and return every event it produced.
    pub async fn chat(self: &Arc<Self>, message: impl Into<String>, session_id: &str) -> Vec<PublicEvent> {
        self.stream_chat(message, session_id).collect().await
    }

    async fn run_turn(&self, message: String, session: String, mut sink: EventSink) {
        if !self.config.model.is_configured() {
            warn!("model not configured, turn rejected");
            sink.emit(PublicEvent::Error {
                content: MISSING_MODEL_CONFIG.to_string(),
            })
            .await;
            return;
        }

        if let Err(e) = self.skills.refresh_snapshot().await {
            warn!(error = %e, "skills snapshot refresh failed, using previous snapshot");
        }
        let system_prompt = self.prompt.build().await;
        let history = self
            .sessions
            .to_chat_messages(&session, self.config.server.history_limit)
            .await;
        let runtime = self.config.model.runtime_model();
        info!(model = %runtime.model, history = history.len(), "turn started");

        sink.emit(PublicEvent::thought(LOADED_THOUGHT)).await;
        if let Some(original) = runtime.replaced.as_deref().filter(|o| *o != runtime.model) {
            sink.emit(PublicEvent::thought(format!(
                "Model {original} is not suited to tool calling here; running this turn with {}.",
                runtime.model
            )))
            .await;
        }

        let request = EngineRequest {
            system_prompt,
            history,
            message: message.clone(),
            tools: Arc::clone(&self.tools),
            model: EngineModel {
                name: runtime.model,
                api_key: self.config.model.api_key.clone(),
                base_url: self.config.model.base_url.clone(),
            },
        };

        let mut pending = vec![SessionEntry::user(message)];
        let mut normalizer = EventNormalizer::new();
        let mut raw = self.engine.stream(request);

        while let Some(item) = raw.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    let text = format!("{e:#}");
                    error!(error = %text, "engine failed mid-turn");
                    pending.push(SessionEntry::assistant(text.clone()));
                    self.persist(&session, &pending).await;
                    sink.emit(PublicEvent::Error { content: text }).await;
                    return;
                }
            };
            let Some(step) = normalizer.normalize(event) else {
                continue;
            };
            match &step {
                Normalized::ToolCall(inv) => {
                    pending.push(SessionEntry::tool_called(&inv.name, inv.input.clone()));
                }
                Normalized::ToolResult { invocation, output } => {
                    pending.push(SessionEntry::tool_finished(
                        &invocation.name,
                        invocation.input.clone(),
                        output.clone(),
                    ));
                }
                Normalized::Thought(_) | Normalized::Final(_) => {}
            }
            sink.emit(step.into()).await;
        }

        if normalizer.pending_tools() > 0 {
            debug!(unfinished = normalizer.pending_tools(), "tool calls without a result");
        }

        let final_text = match normalizer.final_text() {
            Some(text) => text.to_string(),
            None => {
                info!("engine produced no final answer, using fallback");
                sink.emit(PublicEvent::Final {
                    content: FALLBACK_FINAL.to_string(),
                })
                .await;
                FALLBACK_FINAL.to_string()
            }
        };
        pending.push(SessionEntry::assistant(final_text));
        self.persist(&session, &pending).await;
    }

    async fn persist(&self, session: &str, entries: &[SessionEntry]) {
        match self.sessions.append(session, entries).await {
            Ok(()) => info!(entries = entries.len(), "turn persisted"),
            Err(e) => error!(error = %e, "failed to persist turn"),
        }
    }
}
