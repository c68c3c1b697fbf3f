//! Integration tests for the built-in tool catalogue.

use std::sync::Arc;

use mini_openclaw::knowledge::{KeywordKnowledge, NO_MATCHES};
use mini_openclaw::tools::{ToolContext, ToolRegistry};
use serde_json::{json, Value};
use tempfile::TempDir;

fn registry(root: &TempDir) -> ToolRegistry {
    let knowledge = Arc::new(KeywordKnowledge::new(root.path().join("knowledge")));
    let ctx = ToolContext::new(root.path().to_path_buf(), knowledge).unwrap();
    ToolRegistry::core(&ctx)
}

#[test]
fn core_catalogue() {
    let root = TempDir::new().unwrap();
    let names: Vec<String> = registry(&root).list().into_iter().map(|m| m.name).collect();
    assert_eq!(
        names,
        vec!["terminal", "python_repl", "fetch_url", "read_file", "search_knowledge_base"]
    );
}

#[test]
fn function_defs_use_openai_shape() {
    let root = TempDir::new().unwrap();
    let defs = registry(&root).function_defs();
    for def in &defs {
        assert_eq!(def["type"], "function");
        assert!(def["function"]["name"].is_string());
        assert_eq!(def["function"]["parameters"]["type"], "object");
    }
}

#[tokio::test]
async fn terminal_runs_in_root() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("marker.txt"), "").unwrap();
    let out = registry(&root)
        .call("terminal", json!({"command": "ls"}))
        .await
        .unwrap();
    assert!(out.as_str().unwrap().contains("marker.txt"));
}

#[tokio::test]
async fn terminal_refuses_traversal() {
    let root = TempDir::new().unwrap();
    let out = registry(&root)
        .call("terminal", json!({"command": "cat ../secret"}))
        .await
        .unwrap();
    assert!(out.as_str().unwrap().starts_with("Blocked"));
}

#[tokio::test]
async fn read_file_through_registry() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("skills/weather")).unwrap();
    std::fs::write(root.path().join("skills/weather/SKILL.md"), "# Weather").unwrap();

    let out = registry(&root)
        .call("read_file", json!({"path": "skills/weather/SKILL.md"}))
        .await
        .unwrap();
    assert_eq!(out, json!({"content": "# Weather"}));
}

#[tokio::test]
async fn knowledge_search_through_registry() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("knowledge")).unwrap();
    std::fs::write(
        root.path().join("knowledge/faq.md"),
        "Refunds take five days.\n\nShipping is free over $50.",
    )
    .unwrap();
    let tools = registry(&root);

    let hit = tools
        .call("search_knowledge_base", json!({"query": "refunds"}))
        .await
        .unwrap();
    assert!(hit.as_str().unwrap().contains("Refunds take five days."));
    assert!(!hit.as_str().unwrap().contains("Shipping"));

    let miss = tools
        .call("search_knowledge_base", json!({"query": "warranty"}))
        .await
        .unwrap();
    assert_eq!(miss, Value::String(NO_MATCHES.into()));
}

#[tokio::test]
async fn unknown_tool_is_an_error() {
    let root = TempDir::new().unwrap();
    let err = registry(&root).call("nope", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("unknown tool"));
}
