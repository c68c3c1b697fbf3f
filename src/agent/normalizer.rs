use serde_json::Value;

use super::correlator::{ToolCallCorrelator, ToolInvocation};
use super::events::{PublicEvent, RawEvent};
use crate::utils::truncate_with_marker;

/// Longest tool output forwarded to clients, in characters.
pub const TOOL_OUTPUT_CAP: usize = 2000;

/// A raw event after normalization.
///
/// Tool results keep the input recorded at the matching start so the
/// orchestrator can write a complete session entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Thought(String),
    ToolCall(ToolInvocation),
    ToolResult {
        invocation: ToolInvocation,
        output: String,
    },
    Final(String),
}

impl From<Normalized> for PublicEvent {
    fn from(step: Normalized) -> Self {
        match step {
            Normalized::Thought(content) => PublicEvent::Thought { content },
            Normalized::ToolCall(inv) => PublicEvent::ToolCall {
                name: inv.name,
                input: inv.input,
            },
            Normalized::ToolResult { invocation, output } => PublicEvent::ToolResult {
                name: invocation.name,
                output,
            },
            Normalized::Final(content) => PublicEvent::Final { content },
        }
    }
}

/// Per-turn translator from raw engine events to public events.
///
/// Only the first non-blank chain output of a turn becomes the final answer.
#[derive(Debug, Default)]
pub struct EventNormalizer {
    correlator: ToolCallCorrelator,
    final_text: Option<String>,
}

impl EventNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, event: RawEvent) -> Option<Normalized> {
        match event {
            RawEvent::ModelToken { chunk, .. } => {
                let text = chunk.map(|c| c.text()).unwrap_or_default();
                (!text.is_empty()).then_some(Normalized::Thought(text))
            }
            RawEvent::ToolStart {
                run_id,
                name,
                input,
            } => {
                let invocation = ToolInvocation::new(name, input);
                self.correlator.start(run_id, invocation.clone());
                Some(Normalized::ToolCall(invocation))
            }
            RawEvent::ToolEnd {
                run_id,
                name,
                output,
            } => {
                let invocation = self.correlator.finish(&run_id, name);
                Some(Normalized::ToolResult {
                    invocation,
                    output: shorten_output(output.as_ref(), TOOL_OUTPUT_CAP),
                })
            }
            RawEvent::ChainEnd { output, .. } => {
                if self.final_text.is_some() {
                    return None;
                }
                let text = output.map(|o| o.final_text()).unwrap_or_default();
                if text.trim().is_empty() {
                    return None;
                }
                self.final_text = Some(text.clone());
                Some(Normalized::Final(text))
            }
            RawEvent::Other => None,
        }
    }

    /// The final answer, once one has been emitted.
    pub fn final_text(&self) -> Option<&str> {
        self.final_text.as_deref()
    }

    pub fn pending_tools(&self) -> usize {
        self.correlator.in_flight()
    }
}

/// Render a tool output as text and cap it at `max_chars`.
///
/// Strings are used as-is, `null` becomes empty and anything else is
/// JSON-encoded.
pub fn shorten_output(output: Option<&Value>, max_chars: usize) -> String {
    let raw = match output {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    truncate_with_marker(&raw, max_chars)
}
