use std::collections::HashMap;

use serde_json::{json, Value};

/// Name used when an engine reports a tool without one.
pub const DEFAULT_TOOL_NAME: &str = "tool";

/// Name and arguments of one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub input: Value,
}

impl ToolInvocation {
    /// Fill in the defaults for a missing name or input.
    pub fn new(name: Option<String>, input: Option<Value>) -> Self {
        Self {
            name: name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_TOOL_NAME.to_string()),
            input: input.filter(|v| !v.is_null()).unwrap_or_else(|| json!({})),
        }
    }
}

/// Matches tool-end events to their tool-start by run id.
///
/// Lives for exactly one turn; calls with distinct run ids may interleave
/// in any order.
#[derive(Debug, Default)]
pub struct ToolCallCorrelator {
    started: HashMap<String, StartedCall>,
}

#[derive(Debug)]
struct StartedCall {
    invocation: ToolInvocation,
    finished: bool,
}

impl ToolCallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, run_id: impl Into<String>, invocation: ToolInvocation) {
        self.started.insert(
            run_id.into(),
            StartedCall {
                invocation,
                finished: false,
            },
        );
    }

    /// Close the call for `run_id`.
    ///
    /// The start stays cached for the rest of the turn, so a repeated end
    /// reports the same name and input. An end without a matching start
    /// yields empty input and the name carried by the end event.
    pub fn finish(&mut self, run_id: &str, end_name: Option<String>) -> ToolInvocation {
        match self.started.get_mut(run_id) {
            Some(call) => {
                call.finished = true;
                call.invocation.clone()
            }
            None => ToolInvocation::new(end_name, None),
        }
    }

    /// Number of calls started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.started.values().filter(|c| !c.finished).count()
    }
}
