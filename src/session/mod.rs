//! Per-session conversation log.
//!
//! Each session is one `sessions/<id>.json` file holding a pretty-printed
//! JSON array of [`SessionEntry`] records in chronological order. Files
//! are only ever rewritten whole: [`SessionStore::append`] loads the raw
//! records, extends them and saves.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::models::ChatMessage;

/// Longest normalized session id.
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Id used when a requested id normalizes to nothing.
pub const DEFAULT_SESSION_ID: &str = "default";

// ── Entries ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    User,
    Assistant,
    Tool,
}

/// Tool details carried by `tool` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDetail {
    pub name: String,
    #[serde(default)]
    pub input: Value,
    /// Present on the entry recorded when the tool finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// One immutable record in a session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Creation time, UTC.
    #[serde(default)]
    pub ts: DateTime<Utc>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolDetail>,
}

impl SessionEntry {
    fn now(kind: EntryKind, content: impl Into<String>, tool: Option<ToolDetail>) -> Self {
        Self {
            kind,
            ts: Utc::now(),
            content: content.into(),
            tool,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::now(EntryKind::User, content, None)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::now(EntryKind::Assistant, content, None)
    }

    /// Entry recorded when a tool is invoked.
    pub fn tool_called(name: &str, input: Value) -> Self {
        Self::now(
            EntryKind::Tool,
            format!("{name} called"),
            Some(ToolDetail {
                name: name.to_string(),
                input,
                output: None,
            }),
        )
    }

    /// Entry recorded when a tool returns.
    pub fn tool_finished(name: &str, input: Value, output: String) -> Self {
        Self::now(
            EntryKind::Tool,
            format!("{name} result"),
            Some(ToolDetail {
                name: name.to_string(),
                input,
                output: Some(output),
            }),
        )
    }
}

/// Listing row for one stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Map an arbitrary client-supplied id onto a safe file stem.
///
/// Characters outside `[A-Za-z0-9_-]` become `-`, leading and trailing
/// dashes are stripped and the result is cut to 64 characters.
pub fn normalize_session_id(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cut: String = replaced
        .trim_matches('-')
        .chars()
        .take(MAX_SESSION_ID_LEN)
        .collect();
    if cut.is_empty() {
        DEFAULT_SESSION_ID.to_string()
    } else {
        cut
    }
}

// ── SessionStore ────────────────────────────────────────────

/// File-backed session log rooted at one directory.
///
/// Holds no in-memory state; concurrent writers to one session race and
/// the last save wins.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Backing file for `id` (normalized).
    pub fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", normalize_session_id(id)))
    }

    /// Every entry of the session, oldest first.
    ///
    /// A missing or unreadable file is an empty session; malformed records
    /// are skipped.
    pub async fn load(&self, id: &str) -> Vec<SessionEntry> {
        self.load_records(id)
            .await
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<SessionEntry>(record) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "skipping malformed session entry");
                    None
                }
            })
            .collect()
    }

    /// The stored records as raw JSON, including ones `load` would skip.
    async fn load_records(&self, id: &str) -> Vec<Value> {
        let path = self.path(id);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "session file unreadable");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(records)) => records,
            Ok(_) => {
                debug!(path = %path.display(), "session file is not a JSON array");
                Vec::new()
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "session file is malformed");
                Vec::new()
            }
        }
    }

    /// Overwrite the session with `entries`.
    pub async fn save(&self, id: &str, entries: &[SessionEntry]) -> anyhow::Result<()> {
        self.write_records(id, entries).await
    }

    /// Extend the session with `new_entries`, keeping their order.
    ///
    /// Existing records are carried over as stored, even ones that do not
    /// parse as [`SessionEntry`].
    pub async fn append(&self, id: &str, new_entries: &[SessionEntry]) -> anyhow::Result<()> {
        let mut records = self.load_records(id).await;
        for entry in new_entries {
            records.push(serde_json::to_value(entry).context("serialize session entry")?);
        }
        self.write_records(id, records.as_slice()).await
    }

    async fn write_records<T: Serialize>(&self, id: &str, records: &[T]) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .context("create sessions dir")?;

        let path = self.path(id);
        let body = serde_json::to_string_pretty(records).context("serialize session entries")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("write session file {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replace session file {}", path.display()))?;

        debug!(path = %path.display(), entries = records.len(), "session saved");
        Ok(())
    }

    /// Stored sessions, most recently modified first.
    pub async fn list(&self) -> anyhow::Result<Vec<SessionSummary>> {
        let mut rd = match fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("read {}", self.dir.display()));
            }
        };

        let mut rows: Vec<(SystemTime, SessionSummary)> = Vec::new();
        while let Some(entry) = rd.next_entry().await.context("read sessions dir entry")? {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            rows.push((
                modified,
                SessionSummary {
                    id,
                    updated_at: DateTime::<Utc>::from(modified),
                    size_bytes: meta.len(),
                },
            ));
        }

        rows.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(rows.into_iter().map(|(_, s)| s).collect())
    }

    /// The last `limit` user/assistant entries as chat messages.
    pub async fn to_chat_messages(&self, id: &str, limit: usize) -> Vec<ChatMessage> {
        let messages: Vec<ChatMessage> = self
            .load(id)
            .await
            .into_iter()
            .filter_map(|entry| match entry.kind {
                EntryKind::User => Some(ChatMessage::new("user", entry.content)),
                EntryKind::Assistant => Some(ChatMessage::new("assistant", entry.content)),
                EntryKind::Tool => None,
            })
            .collect();
        let skip = messages.len().saturating_sub(limit);
        messages.into_iter().skip(skip).collect()
    }

    /// Remove the session file. Returns `false` when there was none.
    pub async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let path = self.path(id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "session deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}
