//! Built-in `python_repl` tool: runs a Python snippet with `python3 -c`.

use std::path::PathBuf;

use anyhow::Context as _;
use serde_json::{json, Value};
use tokio::process::Command;

use super::terminal::{run_captured, COMMAND_TIMEOUT, OUTPUT_CAP};
use crate::tools::{str_arg, ToolContext, ToolMeta, ToolRegistry};
use crate::utils::truncate_with_marker;

/// Interpreter binary looked up on `PATH`.
const PYTHON_BIN: &str = "python3";

pub async fn python_repl(root: PathBuf, args: Value) -> anyhow::Result<Value> {
    let code = str_arg("python_repl", &args, "code")?;
    if code.trim().is_empty() {
        return Ok(Value::String("No code provided.".into()));
    }
    let mut cmd = Command::new(PYTHON_BIN);
    cmd.arg("-c").arg(code).current_dir(&root);
    let text = run_captured(cmd, COMMAND_TIMEOUT)
        .await
        .with_context(|| format!("python_repl: {PYTHON_BIN}"))?;
    Ok(Value::String(truncate_with_marker(&text, OUTPUT_CAP)))
}

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let root = ctx.root_dir.clone();
    registry.register(
        ToolMeta {
            name: "python_repl".into(),
            description: "Run Python code and return what it prints. Use print() to see results.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string", "description": "Python source to execute." }
                },
                "required": ["code"],
                "additionalProperties": false
            }),
        },
        move |args| python_repl(root.clone(), args),
    );
}
