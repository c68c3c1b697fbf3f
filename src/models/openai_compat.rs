//! Reasoning engine for any OpenAI-compatible chat completions API.
//!
//! Works with DeepSeek, OpenAI, OpenRouter, Moonshot, Ollama, vLLM and
//! anything else that speaks `/chat/completions` with `stream: true` and
//! function calling.
//!
//! One turn is a loop of model steps. Content deltas are surfaced as
//! `model-token` events, each step ends with a `chain-end` carrying the
//! assistant message, and requested tools run through the
//! [`ToolRegistry`](crate::tools::ToolRegistry) between `tool-start` and
//! `tool-end`. The loop stops at the first step without tool calls.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{serialize_messages, ChatMessage, EngineRequest, RawEventStream, ReasoningEngine};
use crate::agent::events::{
    ChainOutput, ChainRecord, ChatRecord, Chunk, MessageContent, MessageList, MessageSlot, RawEvent,
};

/// Used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `{base}/chat/completions`, tolerating trailing slashes and full URLs.
pub fn completions_endpoint(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let base = if base.is_empty() { DEFAULT_BASE_URL } else { base };
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

pub struct OpenAiEngine {
    client: Client,
    max_iterations: usize,
}

impl OpenAiEngine {
    pub fn new(max_iterations: usize) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::with_client(client, max_iterations))
    }

    pub fn with_client(client: Client, max_iterations: usize) -> Self {
        Self {
            client,
            max_iterations: max_iterations.max(1),
        }
    }
}

// ── Streaming step accumulation ─────────────────────────────

/// A tool call assembled from streamed deltas.
#[derive(Debug, Clone, Default, PartialEq)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingCall {
    fn to_api(&self) -> Value {
        json!({
            "id": self.id,
            "type": "function",
            "function": { "name": self.name, "arguments": self.arguments },
        })
    }

    /// Arguments as JSON; unparseable text is passed through under `raw`.
    fn input(&self) -> Value {
        if self.arguments.trim().is_empty() {
            return json!({});
        }
        serde_json::from_str(&self.arguments).unwrap_or_else(|_| json!({ "raw": self.arguments }))
    }
}

#[derive(Debug, Default)]
struct StepAccumulator {
    content: String,
    calls: BTreeMap<u64, PendingCall>,
}

impl StepAccumulator {
    /// Fold one `choices[0].delta`; returns new visible text, if any.
    fn absorb(&mut self, delta: &Value) -> Option<String> {
        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for (pos, tc) in tool_calls.iter().enumerate() {
                let index = tc.get("index").and_then(Value::as_u64).unwrap_or(pos as u64);
                let call = self.calls.entry(index).or_default();
                if let Some(id) = tc.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) {
                    call.id = id.to_string();
                }
                let function = &tc["function"];
                if let Some(name) = function.get("name").and_then(Value::as_str) {
                    call.name.push_str(name);
                }
                if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                    call.arguments.push_str(args);
                }
            }
        }

        let piece = delta.get("content").and_then(Value::as_str)?;
        if piece.is_empty() {
            return None;
        }
        self.content.push_str(piece);
        Some(piece.to_string())
    }

    fn into_parts(self) -> (String, Vec<PendingCall>) {
        let calls = self
            .calls
            .into_values()
            .filter(|c| !c.name.is_empty())
            .map(|mut c| {
                if c.id.is_empty() {
                    c.id = format!("call_{}", Uuid::new_v4().simple());
                }
                c
            })
            .collect();
        (self.content, calls)
    }
}

fn chain_output(messages: &[ChatMessage]) -> ChainOutput {
    let slots = messages
        .iter()
        .map(|m| {
            MessageSlot::Record(ChatRecord {
                kind: None,
                role: Some(m.role.clone()),
                content: Some(MessageContent::Text(m.content.clone())),
                tool_calls: m.tool_calls.clone().map(Value::Array),
            })
        })
        .collect();
    ChainOutput::Record(ChainRecord {
        messages: Some(MessageList::Items(slots)),
        ..ChainRecord::default()
    })
}

fn tool_message_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ReasoningEngine for OpenAiEngine {
    fn stream(&self, request: EngineRequest) -> RawEventStream {
        let client = self.client.clone();
        let max_iterations = self.max_iterations;

        Box::pin(async_stream::try_stream! {
            use tokio_stream::StreamExt as _;

            let endpoint = completions_endpoint(&request.model.base_url);
            let tool_defs = request.tools.function_defs();
            let mut messages = request.messages();
            let turn_run = Uuid::new_v4().to_string();

            for iteration in 0..max_iterations {
                let step_run = Uuid::new_v4().to_string();
                let mut body = json!({
                    "model": request.model.name,
                    "messages": serialize_messages(&messages),
                    "stream": true,
                });
                if !tool_defs.is_empty() {
                    body["tools"] = json!(tool_defs);
                }

                let mut req = client.post(&endpoint).json(&body);
                if !request.model.api_key.is_empty() {
                    req = req.bearer_auth(&request.model.api_key);
                }
                debug!(%endpoint, model = %request.model.name, iteration, "chat completion step");
                let resp = req
                    .send()
                    .await
                    .with_context(|| format!("request to {endpoint} failed"))?;

                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    Err(anyhow::anyhow!("chat completions API returned {status}: {text}"))?;
                    return;
                }

                let mut step = StepAccumulator::default();
                let mut byte_stream = resp.bytes_stream();
                let mut buffer: Vec<u8> = Vec::new();

                'read: while let Some(chunk) = byte_stream.next().await {
                    let chunk = chunk.context("read completion stream")?;
                    buffer.extend_from_slice(&chunk);

                    while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                        let raw_line: Vec<u8> = buffer.drain(..=newline_pos).collect();
                        let line = String::from_utf8_lossy(&raw_line);
                        let Some(data) = line.trim().strip_prefix("data:") else {
                            continue;
                        };
                        let data = data.trim();
                        if data == "[DONE]" {
                            break 'read;
                        }
                        let Ok(json) = serde_json::from_str::<Value>(data) else {
                            continue;
                        };
                        if let Some(err) = json.get("error") {
                            Err(anyhow::anyhow!("chat completions stream error: {err}"))?;
                        }
                        if let Some(piece) = step.absorb(&json["choices"][0]["delta"]) {
                            yield RawEvent::ModelToken {
                                run_id: step_run.clone(),
                                chunk: Some(Chunk::Text(piece)),
                            };
                        }
                    }
                }

                let (content, calls) = step.into_parts();
                let mut assistant = ChatMessage::new("assistant", content);
                if !calls.is_empty() {
                    assistant.tool_calls = Some(calls.iter().map(PendingCall::to_api).collect());
                }
                yield RawEvent::ChainEnd {
                    run_id: step_run.clone(),
                    output: Some(chain_output(std::slice::from_ref(&assistant))),
                };
                messages.push(assistant);

                if calls.is_empty() {
                    debug!(steps = iteration + 1, "engine turn complete");
                    yield RawEvent::ChainEnd {
                        run_id: turn_run.clone(),
                        output: Some(chain_output(&messages)),
                    };
                    return;
                }

                for call in &calls {
                    let input = call.input();
                    yield RawEvent::ToolStart {
                        run_id: call.id.clone(),
                        name: Some(call.name.clone()),
                        input: Some(input.clone()),
                    };
                    let output = match request.tools.call(&call.name, input).await {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "tool call failed, reporting to model");
                            json!({ "error": format!("{e:#}") })
                        }
                    };
                    let text = tool_message_text(&output);
                    yield RawEvent::ToolEnd {
                        run_id: call.id.clone(),
                        name: Some(call.name.clone()),
                        output: Some(output),
                    };
                    messages.push(ChatMessage::tool_result(call.id.clone(), text));
                }
            }

            Err(anyhow::anyhow!(
                "model kept calling tools after {max_iterations} steps without a final answer"
            ))?;
        })
    }
}
