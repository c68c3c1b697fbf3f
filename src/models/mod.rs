//! Reasoning-engine abstractions.
//!
//! Defines the [`ReasoningEngine`] trait the orchestrator drives, the
//! [`ChatMessage`] type shared with the session history, runtime model
//! selection, and the OpenAI-compatible reference engine
//! ([`OpenAiEngine`]).

pub mod openai_compat;

use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;

use crate::agent::events::RawEvent;
use crate::tools::ToolRegistry;

pub use openai_compat::OpenAiEngine;

// ---------------------------------------------------------------------------
// ChatMessage – shared message representation
// ---------------------------------------------------------------------------

/// A single chat message with a role and content.
///
/// Optionally carries OpenAI tool-calling metadata so that
/// `tool` role messages and assistant `tool_calls` responses
/// are serialised correctly for the API.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Raw OpenAI-format `tool_calls` array on assistant messages.
    pub tool_calls: Option<Vec<serde_json::Value>>,
    /// Id of the call a `role: "tool"` message answers.
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Plain message without tool metadata.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Serialise messages into the OpenAI-compatible JSON array format.
pub fn serialize_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = serde_json::json!({ "role": m.role });
            match &m.tool_calls {
                Some(tcs) if !tcs.is_empty() => {
                    msg["tool_calls"] = serde_json::json!(tcs);
                    // content must be null on assistant messages that only call tools
                    msg["content"] = if m.content.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::json!(m.content)
                    };
                }
                _ => msg["content"] = serde_json::json!(m.content),
            }
            if let Some(ref id) = m.tool_call_id {
                msg["tool_call_id"] = serde_json::json!(id);
            }
            msg
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Runtime model selection
// ---------------------------------------------------------------------------

/// Model actually used for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeModel {
    /// Model id sent to the endpoint.
    pub model: String,
    /// The configured model id when it was replaced.
    pub replaced: Option<String>,
}

const DEEPSEEK_HOST: &str = "deepseek.com";
const DEEPSEEK_REASONER: &str = "deepseek-reasoner";
const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// Pick the model for a tool-using turn.
///
/// A non-empty override always wins. Otherwise the DeepSeek reasoner model,
/// which does not support tool calling, is swapped for the chat model when
/// talking to DeepSeek's own endpoint.
pub fn resolve_runtime_model(
    configured: &str,
    base_url: &str,
    override_model: Option<&str>,
) -> RuntimeModel {
    if let Some(over) = override_model.map(str::trim).filter(|s| !s.is_empty()) {
        return RuntimeModel {
            model: over.to_string(),
            replaced: Some(configured.to_string()),
        };
    }
    let is_deepseek = base_url.to_lowercase().contains(DEEPSEEK_HOST);
    if is_deepseek && configured.trim() == DEEPSEEK_REASONER {
        return RuntimeModel {
            model: DEEPSEEK_CHAT.to_string(),
            replaced: Some(DEEPSEEK_REASONER.to_string()),
        };
    }
    RuntimeModel {
        model: configured.to_string(),
        replaced: None,
    }
}

// ---------------------------------------------------------------------------
// ReasoningEngine trait
// ---------------------------------------------------------------------------

/// Endpoint coordinates for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineModel {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
}

/// Everything an engine needs to run one turn.
#[derive(Clone)]
pub struct EngineRequest {
    pub system_prompt: String,
    /// Prior user/assistant messages, oldest first.
    pub history: Vec<ChatMessage>,
    /// The new user message.
    pub message: String,
    /// Tool catalogue and the only way to invoke a tool.
    pub tools: Arc<ToolRegistry>,
    pub model: EngineModel,
}

impl EngineRequest {
    /// System prompt, history and the new user turn, in call order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::new("system", self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::new("user", self.message.clone()));
        messages
    }
}

/// Ordered raw events of one turn. An `Err` item ends the turn.
pub type RawEventStream = Pin<Box<dyn Stream<Item = anyhow::Result<RawEvent>> + Send>>;

/// An opaque reasoning engine.
///
/// The orchestrator knows nothing about how the engine reasons; it only
/// consumes the raw events it produces.
pub trait ReasoningEngine: Send + Sync {
    fn stream(&self, request: EngineRequest) -> RawEventStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let rm = resolve_runtime_model("deepseek-reasoner", "https://api.deepseek.com", Some("gpt-4o"));
        assert_eq!(rm.model, "gpt-4o");
        assert_eq!(rm.replaced.as_deref(), Some("deepseek-reasoner"));
    }

    #[test]
    fn deepseek_reasoner_is_swapped() {
        let rm = resolve_runtime_model("deepseek-reasoner", "https://API.DeepSeek.com/v1", None);
        assert_eq!(rm.model, "deepseek-chat");
        assert_eq!(rm.replaced.as_deref(), Some("deepseek-reasoner"));
    }

    #[test]
    fn reasoner_elsewhere_is_kept() {
        let rm = resolve_runtime_model("deepseek-reasoner", "https://openrouter.ai/api/v1", None);
        assert_eq!(rm.model, "deepseek-reasoner");
        assert!(rm.replaced.is_none());
    }

    #[test]
    fn plain_model_unchanged() {
        let rm = resolve_runtime_model("gpt-4o-mini", "https://api.openai.com/v1", Some(""));
        assert_eq!(
            rm,
            RuntimeModel {
                model: "gpt-4o-mini".into(),
                replaced: None
            }
        );
    }

    #[test]
    fn tool_call_messages_have_null_content() {
        let mut m = ChatMessage::new("assistant", "");
        m.tool_calls = Some(vec![serde_json::json!({"id": "c1"})]);
        let out = serialize_messages(&[m, ChatMessage::tool_result("c1", "ok")]);
        assert!(out[0]["content"].is_null());
        assert_eq!(out[1]["tool_call_id"], "c1");
        assert_eq!(out[1]["role"], "tool");
    }
}
