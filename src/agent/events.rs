//! Raw engine events and the public event vocabulary.
//!
//! Engines emit loosely shaped [`RawEvent`]s. Every shape the normalizer
//! understands is a closed serde enum here, with an `Other` arm for
//! anything it does not.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Public events ───────────────────────────────────────────

/// Event sent to the client, serialized as `{"type": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublicEvent {
    Thought { content: String },
    ToolCall { name: String, input: Value },
    ToolResult { name: String, output: String },
    Final { content: String },
    Error { content: String },
}

impl PublicEvent {
    /// Wire name, used as the SSE `event:` field.
    pub fn kind(&self) -> &'static str {
        match self {
            PublicEvent::Thought { .. } => "thought",
            PublicEvent::ToolCall { .. } => "tool_call",
            PublicEvent::ToolResult { .. } => "tool_result",
            PublicEvent::Final { .. } => "final",
            PublicEvent::Error { .. } => "error",
        }
    }

    pub fn thought(content: impl Into<String>) -> Self {
        PublicEvent::Thought {
            content: content.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PublicEvent::Final { .. } | PublicEvent::Error { .. })
    }
}

// ── Raw events ──────────────────────────────────────────────

/// One event from a reasoning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RawEvent {
    /// A streamed model chunk.
    ModelToken {
        #[serde(default)]
        run_id: String,
        #[serde(default)]
        chunk: Option<Chunk>,
    },
    ToolStart {
        #[serde(default)]
        run_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Option<Value>,
    },
    ToolEnd {
        #[serde(default)]
        run_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        output: Option<Value>,
    },
    /// A chain or graph node finished; its output may hold the final answer.
    ChainEnd {
        #[serde(default)]
        run_id: String,
        #[serde(default)]
        output: Option<ChainOutput>,
    },
    #[serde(other)]
    Other,
}

/// Payload of a `model-token` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Chunk {
    Text(String),
    Message { content: MessageContent },
    Fragment { text: String },
    Other(Value),
}

impl Chunk {
    pub fn text(&self) -> String {
        match self {
            Chunk::Text(s) => s.clone(),
            Chunk::Message { content } => content.text(),
            Chunk::Fragment { text } => text.clone(),
            Chunk::Other(_) => String::new(),
        }
    }
}

/// Message content: a string or a list of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

impl MessageContent {
    /// Concatenated text of all textual blocks.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks.iter().filter_map(ContentBlock::text).collect(),
            MessageContent::Other(_) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Text(String),
    Part { text: String },
    Other(Value),
}

impl ContentBlock {
    fn text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(s) => Some(s),
            ContentBlock::Part { text } => Some(text),
            ContentBlock::Other(_) => None,
        }
    }
}

/// Output of a `chain-end` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainOutput {
    Text(String),
    /// Listed before `Record` so arrays never bind to the record's fields.
    List(Vec<Value>),
    Record(ChainRecord),
    Other(Value),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainRecord {
    #[serde(default)]
    pub messages: Option<MessageList>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub output_text: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageList {
    Items(Vec<MessageSlot>),
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageSlot {
    Record(ChatRecord),
    Other(Value),
}

/// A message as it appears inside chain output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub tool_calls: Option<Value>,
}

impl ChatRecord {
    /// `type` wins over `role` when both are present.
    pub fn is_assistant(&self) -> bool {
        let tag = self
            .kind
            .as_deref()
            .filter(|k| !k.is_empty())
            .or(self.role.as_deref())
            .unwrap_or_default()
            .to_lowercase();
        matches!(tag.as_str(), "assistant" | "ai")
    }

    pub fn has_tool_calls(&self) -> bool {
        match &self.tool_calls {
            Some(Value::Array(calls)) => !calls.is_empty(),
            _ => false,
        }
    }

    pub fn text(&self) -> String {
        self.content.as_ref().map(MessageContent::text).unwrap_or_default()
    }
}

impl ChainOutput {
    /// Best candidate for the user-facing answer, or empty text.
    ///
    /// Plain text is returned verbatim. A record with `messages` yields the
    /// trimmed content of the last assistant message that is not a tool
    /// request; failing that, a string `output` or `output_text` is used.
    pub fn final_text(&self) -> String {
        match self {
            ChainOutput::Text(s) => s.clone(),
            ChainOutput::Record(record) => record.final_text(),
            ChainOutput::List(_) | ChainOutput::Other(_) => String::new(),
        }
    }
}

impl ChainRecord {
    fn final_text(&self) -> String {
        if let Some(MessageList::Items(items)) = &self.messages {
            let answer = items.iter().rev().find_map(|slot| match slot {
                MessageSlot::Record(msg) if msg.is_assistant() && !msg.has_tool_calls() => {
                    let text = msg.text();
                    let trimmed = text.trim();
                    (!trimmed.is_empty()).then(|| trimmed.to_string())
                }
                _ => None,
            });
            if let Some(answer) = answer {
                return answer;
            }
        }
        [&self.output, &self.output_text]
            .into_iter()
            .flatten()
            .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
            .map(str::to_string)
            .unwrap_or_default()
    }
}
