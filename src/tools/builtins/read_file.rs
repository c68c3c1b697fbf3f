//! Built-in `read_file` tool: reads a file under the backend root.
//!
//! Supports optional `start_line` / `end_line` for partial reads (1-based
//! inclusive).

use serde_json::{json, Value};

use crate::files::FileService;
use crate::tools::{str_arg, ToolContext, ToolMeta, ToolRegistry};

/// Read a file below the root.
///
/// Args: `{ "path": "…", "start_line?": N, "end_line?": N }`
/// Returns: `{ "content": "…", "start_line?": N, "end_line?": N, "total_lines?": N }`
pub async fn read_file(files: &FileService, args: Value) -> anyhow::Result<Value> {
    let raw = str_arg("read_file", &args, "path")?;
    let full_content = files
        .read_text(raw)
        .await
        .map_err(|e| anyhow::anyhow!("read_file: {e}"))?;

    let all_lines: Vec<&str> = full_content.split('\n').collect();
    let total_lines = all_lines.len();

    let start = args
        .get("start_line")
        .and_then(Value::as_u64)
        .map(|v| v as usize);
    let end = args
        .get("end_line")
        .and_then(Value::as_u64)
        .map(|v| v as usize);

    let (content, first, last) = match (start, end) {
        (None, None) => return Ok(json!({ "content": full_content })),
        (Some(s), _) if s < 1 || s > total_lines => {
            anyhow::bail!("read_file: start_line {s} out of bounds (file has {total_lines} lines)")
        }
        (Some(s), Some(e)) if e < s => {
            anyhow::bail!("read_file: end_line {e} is before start_line {s}")
        }
        (s, e) => {
            let first = s.unwrap_or(1);
            let last = e.unwrap_or(total_lines).min(total_lines);
            (all_lines[(first - 1)..last].join("\n"), first, last)
        }
    };

    Ok(json!({
        "content": content,
        "start_line": first,
        "end_line": last,
        "total_lines": total_lines,
    }))
}

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let files = ctx.files.clone();
    registry.register(
        ToolMeta {
            name: "read_file".into(),
            description: "Read a file under the backend root. Supports an optional line range.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the backend root, e.g. skills/weather/SKILL.md."
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "Optional 1-based start line (inclusive)."
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "Optional 1-based end line (inclusive)."
                    }
                },
                "required": ["path"],
                "additionalProperties": false
            }),
        },
        move |args| {
            let files = files.clone();
            async move { read_file(&files, args).await }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, FileService) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("workspace")).unwrap();
        std::fs::write(dir.path().join("workspace/notes.md"), "one\ntwo\nthree").unwrap();
        let files = FileService::new(dir.path());
        (dir, files)
    }

    #[tokio::test]
    async fn reads_whole_file() {
        let (_dir, files) = setup();
        let out = read_file(&files, json!({"path": "workspace/notes.md"})).await.unwrap();
        assert_eq!(out, json!({"content": "one\ntwo\nthree"}));
    }

    #[tokio::test]
    async fn reads_line_range() {
        let (_dir, files) = setup();
        let out = read_file(&files, json!({"path": "workspace/notes.md", "start_line": 2, "end_line": 9}))
            .await
            .unwrap();
        assert_eq!(out["content"], "two\nthree");
        assert_eq!(out["end_line"], 3);

        let out = read_file(&files, json!({"path": "workspace/notes.md", "end_line": 1}))
            .await
            .unwrap();
        assert_eq!(out["content"], "one");
    }

    #[tokio::test]
    async fn rejects_escapes_and_bad_ranges() {
        let (_dir, files) = setup();
        assert!(read_file(&files, json!({"path": "../etc/passwd"})).await.is_err());
        assert!(read_file(&files, json!({"path": "/etc/passwd"})).await.is_err());
        assert!(
            read_file(&files, json!({"path": "workspace/notes.md", "start_line": 5}))
                .await
                .is_err()
        );
        assert!(
            read_file(&files, json!({"path": "workspace/notes.md", "start_line": 3, "end_line": 2}))
                .await
                .is_err()
        );
    }
}
