//! Built-in `search_knowledge_base` tool.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::knowledge::KnowledgeBase;
use crate::tools::{str_arg, ToolContext, ToolMeta, ToolRegistry};

/// Passages requested per search.
pub const TOP_K: usize = 4;

pub async fn search_knowledge_base(kb: Arc<dyn KnowledgeBase>, args: Value) -> anyhow::Result<Value> {
    let query = str_arg("search_knowledge_base", &args, "query")?;
    Ok(Value::String(kb.search(query, TOP_K).await))
}

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) {
    let kb = Arc::clone(&ctx.knowledge);
    registry.register(
        ToolMeta {
            name: "search_knowledge_base".into(),
            description: "Search the local knowledge base and return matching passages.".into(),
            args_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Keywords to look for." }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        },
        move |args| search_knowledge_base(Arc::clone(&kb), args),
    );
}
