//! Built-in `terminal` tool: runs a shell command in the backend root.
//!
//! Commands containing a known destructive pattern or a `..` segment are
//! refused before anything is spawned.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::tools::{str_arg, ToolContext, ToolMeta, ToolRegistry};
use crate::utils::truncate_with_marker;

/// Longest command output returned to the model, in characters.
pub const OUTPUT_CAP: usize = 8000;

/// Wall-clock limit for one command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Substrings that are never allowed in a command (matched lower-cased).
const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf /",
    "mkfs",
    "dd if=",
    "shutdown",
    "reboot",
    "poweroff",
    ":(){",
];

pub const NO_COMMAND: &str = "No command provided.";
pub const BLOCKED_DANGEROUS: &str = "Blocked dangerous command pattern.";
pub const BLOCKED_TRAVERSAL: &str = "Blocked path traversal pattern in command.";

/// Reason a command is refused, if any.
pub fn check_command(command: &str) -> Option<&'static str> {
    let normalized = command.trim();
    if normalized.is_empty() {
        return Some(NO_COMMAND);
    }
    let lower = normalized.to_lowercase();
    if DANGEROUS_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(BLOCKED_DANGEROUS);
    }
    if normalized.contains("..") {
        return Some(BLOCKED_TRAVERSAL);
    }
    None
}

/// Run `cmd` to completion and return stdout followed by stderr.
///
/// A non-zero exit appends `[exit code N]`; a timeout kills the child and
/// is reported as text rather than an error.
pub(crate) async fn run_captured(mut cmd: Command, timeout: Duration) -> anyhow::Result<String> {
    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("spawn failed")?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.context("wait for child")?,
        Err(_elapsed) => {
            return Ok(format!(
                "Command timed out after {}s and was killed.",
                timeout.as_secs()
            ));
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        text.push_str(&format!("\n[exit code {code}]"));
    }
    Ok(text)
}

/// Execute `args.command` with `sh -c` inside `root`.
///
/// Args: `{ "command": "ls -la" }`
/// Returns the combined output as a string.
pub async fn terminal(root: &Path, args: Value) -> anyhow::Result<Value> {
    let command = str_arg("terminal", &args, "command")?;
    if let Some(refusal) = check_command(command) {
        tracing::warn!(command = %command, reason = refusal, "terminal command refused");
        return Ok(Value::String(refusal.to_string()));
    }

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command.trim()).current_dir(root);
    let text = run_captured(cmd, COMMAND_TIMEOUT)
        .await
        .context("terminal")?;
    Ok(Value::String(truncate_with_marker(&text, OUTPUT_CAP)))
}

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let root: PathBuf = ctx.root_dir.clone();
    registry.register(
        ToolMeta {
            name: "terminal".into(),
            description: "Execute shell commands in the backend root with safety guards.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Shell command to run with `sh -c`."
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        },
        move |args| {
            let root = root.clone();
            async move { terminal(&root, args).await }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusals() {
        assert_eq!(check_command("   "), Some(NO_COMMAND));
        assert_eq!(check_command("sudo RM -RF / --no-preserve-root"), Some(BLOCKED_DANGEROUS));
        assert_eq!(check_command(":(){ :|:& };:"), Some(BLOCKED_DANGEROUS));
        assert_eq!(check_command("cat ../KEY.md"), Some(BLOCKED_TRAVERSAL));
        assert_eq!(check_command("ls -la"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_root_and_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "hi").unwrap();

        let out = terminal(dir.path(), json!({"command": "ls"})).await.unwrap();
        assert!(out.as_str().unwrap().contains("marker.txt"));

        let out = terminal(dir.path(), json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        let text = out.as_str().unwrap();
        assert!(text.contains("oops"));
        assert!(text.ends_with("[exit code 3]"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn long_output_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let out = terminal(dir.path(), json!({"command": "yes x | head -n 10000"}))
            .await
            .unwrap();
        assert_eq!(out.as_str().unwrap().chars().count(), OUTPUT_CAP);
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(terminal(dir.path(), json!({})).await.is_err());
    }
}
