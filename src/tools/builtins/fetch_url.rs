//! Built-in `fetch_url` tool: HTTP GET with HTML reduced to plain text.

use anyhow::Context as _;
use serde_json::{json, Value};
use tracing::warn;

use crate::tools::{str_arg, ToolContext, ToolMeta, ToolRegistry};
use crate::utils::truncate_with_marker;

/// Longest page text returned to the model, in characters.
pub const OUTPUT_CAP: usize = 6000;

pub const ONLY_HTTP: &str = "Only http(s) URLs are allowed.";

/// Render width; wide enough that paragraphs are not re-wrapped.
const RENDER_WIDTH: usize = 1000;

/// Render an HTML document as plain text with markdown-style structure.
pub fn html_to_text(html: &str) -> anyhow::Result<String> {
    let rendered = html2text::from_read(html.as_bytes(), RENDER_WIDTH)
        .context("render html as text")?;

    let mut out = String::with_capacity(rendered.len());
    let mut blank_run = 0;
    for line in rendered.lines().map(str::trim_end) {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    Ok(out.trim().to_string())
}

/// Reduce a response body to model-friendly text.
pub fn clean_body(raw: &str) -> String {
    let text = raw.trim();
    let lower = text.to_lowercase();
    let text = if lower.contains("<html") || lower.contains("<body") {
        match html_to_text(text) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(error = %e, "html rendering failed, returning raw body");
                text.to_string()
            }
        }
    } else {
        text.to_string()
    };
    truncate_with_marker(&text, OUTPUT_CAP)
}

pub async fn fetch_url(client: &reqwest::Client, args: Value) -> anyhow::Result<Value> {
    let target = str_arg("fetch_url", &args, "url")?.trim();
    if !(target.starts_with("http://") || target.starts_with("https://")) {
        return Ok(Value::String(ONLY_HTTP.into()));
    }

    let resp = client
        .get(target)
        .send()
        .await
        .with_context(|| format!("fetch_url: request to {target} failed"))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .with_context(|| format!("fetch_url: reading body of {target}"))?;
    tracing::debug!(url = %target, %status, bytes = body.len(), "fetched url");

    let text = clean_body(&body);
    if status.is_success() {
        Ok(Value::String(text))
    } else {
        Ok(Value::String(format!("HTTP {status}\n{text}")))
    }
}

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let client = ctx.http.clone();
    registry.register(
        ToolMeta {
            name: "fetch_url".into(),
            description: "Fetch a URL and return cleaned plain text.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "Absolute http(s) URL." }
                },
                "required": ["url"],
                "additionalProperties": false
            }),
        },
        move |args| {
            let client = client.clone();
            async move { fetch_url(&client, args).await }
        },
    );
}
