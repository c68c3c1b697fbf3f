use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{resolve_runtime_model, RuntimeModel};

/// Provider used when `MODEL_PROVIDER` is unset.
pub const DEFAULT_PROVIDER: &str = "deepseek";

/// Credentials and model id for the OpenAI-compatible endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Value of `OPENAI_TOOL_MODEL` at load time, if non-empty.
    pub tool_model_override: Option<String>,
}

impl ModelSettings {
    /// A turn can only run with both a model id and a credential.
    pub fn is_configured(&self) -> bool {
        !self.model.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    /// Effective model for tool-using turns.
    pub fn runtime_model(&self) -> RuntimeModel {
        resolve_runtime_model(
            &self.model,
            &self.base_url,
            self.tool_model_override.as_deref(),
        )
    }

    /// Resolve settings from the process environment over `KEY.md`.
    pub fn from_env(project_root: &Path) -> Self {
        Self::resolve_with(project_root, |name| std::env::var(name).ok())
    }

    /// Resolve settings with an explicit variable lookup.
    ///
    /// Environment values win over the selected `KEY.md` provider section;
    /// an unknown provider falls back to keys written before any heading.
    pub fn resolve_with(project_root: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provider = var("MODEL_PROVIDER")
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
            .trim()
            .to_lowercase();

        let key_md = project_root.join("KEY.md");
        let providers = match std::fs::read_to_string(&key_md) {
            Ok(text) => parse_key_md(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %key_md.display(), error = %e, "failed to read KEY.md");
                HashMap::new()
            }
        };
        let section = providers
            .get(&provider)
            .filter(|s| !s.is_empty())
            .or_else(|| providers.get("default"))
            .cloned()
            .unwrap_or_default();

        let pick = |env: &str, key: &str| {
            var(env)
                .or_else(|| section.get(key).cloned())
                .unwrap_or_default()
        };

        Self {
            base_url: pick("OPENAI_BASE_URL", "base_url"),
            api_key: pick("OPENAI_API_KEY", "api_key"),
            model: pick("OPENAI_MODEL", "model"),
            tool_model_override: var("OPENAI_TOOL_MODEL").map(|v| v.trim().to_string()),
        }
    }
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^##\s+\d+\.\d+\s+(.+)$").expect("valid heading regex"))
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(base_url|api_key|model)\s*=\s*"([^"]*)"\s*$"#).expect("valid key regex")
    })
}

/// Parse the provider sections of a `KEY.md` file.
///
/// Headings look like `## 1.2 DeepSeek (official)`; the first word of the
/// title, lower-cased, names the provider. Lines before any heading belong
/// to `"default"`.
pub fn parse_key_md(text: &str) -> HashMap<String, HashMap<String, String>> {
    let mut providers: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current = "default".to_string();
    providers.insert(current.clone(), HashMap::new());

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = heading_re().captures(line) {
            current = caps[1]
                .split_whitespace()
                .next()
                .unwrap_or("default")
                .to_lowercase();
            providers.entry(current.clone()).or_default();
            continue;
        }
        if let Some(caps) = key_value_re().captures(line) {
            providers
                .entry(current.clone())
                .or_default()
                .insert(caps[1].to_string(), caps[2].to_string());
        }
    }
    providers
}

// ---------------------------------------------------------------------------
// Server settings (config.yaml)
// ---------------------------------------------------------------------------

fn default_addr() -> String {
    "0.0.0.0:8002".to_string()
}

fn default_history_limit() -> usize {
    30
}

fn default_max_tool_iterations() -> usize {
    8
}

/// Optional `config.yaml` in the backend root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Listen address for `serve`.
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Number of prior user/assistant messages handed to the engine.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Model round-trips allowed per turn by the reference engine.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            history_limit: default_history_limit(),
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

impl ServerSettings {
    /// Read `path`; a missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config.yaml, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()))
            }
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).context("failed to parse config YAML")
    }
}

// ---------------------------------------------------------------------------
// Application config
// ---------------------------------------------------------------------------

/// Everything the backend needs to know about its environment.
///
/// Built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Parent of the backend root; holds `KEY.md` and `tmp/`.
    pub project_root: PathBuf,
    /// The backend root; every file path the API accepts is relative to it.
    pub root_dir: PathBuf,
    pub memory_file: PathBuf,
    pub sessions_dir: PathBuf,
    pub skills_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub knowledge_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub model: ModelSettings,
    pub server: ServerSettings,
    /// Bearer token required on `/api/*` when set.
    pub api_token: Option<String>,
}

impl AppConfig {
    /// Lay out the directory tree under `root_dir` with explicit settings.
    pub fn with_settings(root_dir: PathBuf, model: ModelSettings, server: ServerSettings) -> Self {
        let project_root = root_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root_dir.clone());
        Self {
            memory_file: root_dir.join("memory").join("MEMORY.md"),
            sessions_dir: root_dir.join("sessions"),
            skills_dir: root_dir.join("skills"),
            workspace_dir: root_dir.join("workspace"),
            knowledge_dir: root_dir.join("knowledge"),
            storage_dir: root_dir.join("storage"),
            tmp_dir: project_root.join("tmp"),
            project_root,
            root_dir,
            model,
            server: ServerSettings::default().merge(server),
            api_token: None,
        }
    }

    /// Load the full configuration for `root_dir` from the environment,
    /// `KEY.md` and `config.yaml`.
    pub async fn load(root_dir: PathBuf) -> anyhow::Result<Self> {
        let root_dir = if root_dir.is_relative() {
            std::env::current_dir()
                .context("resolve current directory")?
                .join(root_dir)
        } else {
            root_dir
        };
        let server = ServerSettings::load(&root_dir.join("config.yaml")).await?;
        let mut config = Self::with_settings(root_dir, ModelSettings::default(), server);
        config.model = ModelSettings::from_env(&config.project_root);
        config.api_token = std::env::var("MINI_OPENCLAW_API_TOKEN")
            .ok()
            .filter(|s| !s.is_empty());

        tracing::debug!(
            root = %config.root_dir.display(),
            model = %config.model.model,
            configured = config.model.is_configured(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Create every runtime directory the backend writes into.
    pub async fn ensure_runtime_dirs(&self) -> anyhow::Result<()> {
        let memory_dir = self
            .memory_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root_dir.join("memory"));
        let dirs = [
            self.root_dir.clone(),
            memory_dir.join("logs"),
            memory_dir,
            self.sessions_dir.clone(),
            self.skills_dir.clone(),
            self.workspace_dir.clone(),
            self.knowledge_dir.clone(),
            self.storage_dir.clone(),
            self.tmp_dir.clone(),
        ];
        for dir in &dirs {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create runtime dir {}", dir.display()))?;
        }
        Ok(())
    }
}

impl ServerSettings {
    /// Replace zero limits with their defaults.
    fn merge(self, other: ServerSettings) -> Self {
        Self {
            addr: if other.addr.trim().is_empty() {
                self.addr
            } else {
                other.addr
            },
            history_limit: if other.history_limit == 0 {
                self.history_limit
            } else {
                other.history_limit
            },
            max_tool_iterations: if other.max_tool_iterations == 0 {
                self.max_tool_iterations
            } else {
                other.max_tool_iterations
            },
        }
    }
}
