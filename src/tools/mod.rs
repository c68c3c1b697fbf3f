//! Tool catalogue and dispatch.
//!
//! A [`ToolRegistry`] owns the metadata and async handler of every tool the
//! engine may call. [`ToolRegistry::core`] builds the fixed built-in set:
//! `terminal`, `python_repl`, `fetch_url`, `read_file` and
//! `search_knowledge_base`, all rooted at the backend directory.

pub mod builtins;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::files::FileService;
use crate::knowledge::KnowledgeBase;

// ── Tool metadata ───────────────────────────────────────────

/// Metadata describing a tool available to the engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolMeta {
    /// Short machine-friendly name (e.g. `"read_file"`).
    pub name: String,
    /// One-line description shown to the model.
    pub description: String,
    /// JSON Schema object describing the expected `args` value.
    pub args_schema: Value,
}

impl ToolMeta {
    /// OpenAI function-calling definition for this tool.
    pub fn function_def(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.args_schema,
            }
        })
    }
}

/// Async handler a tool registers for dispatch.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>> + Send + Sync>;

struct ToolEntry {
    meta: ToolMeta,
    handler: ToolHandler,
}

/// Shared dependencies of the built-in tools.
#[derive(Clone)]
pub struct ToolContext {
    /// Working directory for commands and sandbox for file reads.
    pub root_dir: PathBuf,
    pub files: FileService,
    pub knowledge: Arc<dyn KnowledgeBase>,
    pub http: reqwest::Client,
}

impl ToolContext {
    pub fn new(root_dir: PathBuf, knowledge: Arc<dyn KnowledgeBase>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("mini-openclaw/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            files: FileService::new(root_dir.clone()),
            root_dir,
            knowledge,
            http,
        })
    }
}

// ── Registry ────────────────────────────────────────────────

#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalogue.
    pub fn core(ctx: &ToolContext) -> Self {
        let mut registry = Self::new();
        builtins::terminal::register(&mut registry, ctx);
        builtins::python_repl::register(&mut registry, ctx);
        builtins::fetch_url::register(&mut registry, ctx);
        builtins::read_file::register(&mut registry, ctx);
        builtins::search_knowledge::register(&mut registry, ctx);
        registry
    }

    /// Add a tool. Duplicate names are ignored (first registration wins).
    pub fn register<F, Fut>(&mut self, meta: ToolMeta, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if self.contains(&meta.name) {
            warn!(tool = %meta.name, "duplicate tool registration ignored");
            return;
        }
        let handler: ToolHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.entries.push(ToolEntry { meta, handler });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.meta.name == name)
    }

    pub fn list(&self) -> Vec<ToolMeta> {
        self.entries.iter().map(|e| e.meta.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Definitions for the `tools` field of a chat completion request.
    pub fn function_defs(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.meta.function_def()).collect()
    }

    /// Invoke tool `name` with `args`.
    pub async fn call(&self, name: &str, args: Value) -> anyhow::Result<Value> {
        let handler = self
            .entries
            .iter()
            .find(|e| e.meta.name == name)
            .map(|e| Arc::clone(&e.handler))
            .ok_or_else(|| anyhow::anyhow!("unknown tool: {name}"))?;
        debug!(tool = %name, "invoking tool");
        handler(args).await
    }
}

/// Pull a required string argument out of `args`.
pub(crate) fn str_arg<'a>(tool: &str, args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("{tool}: missing `{key}` argument"))
}
