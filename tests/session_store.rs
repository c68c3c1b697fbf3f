//! Integration tests for the file-backed `SessionStore`.

use std::time::Duration;

use mini_openclaw::session::{EntryKind, SessionEntry, SessionStore};
use serde_json::json;
use tempfile::TempDir;

fn store() -> (TempDir, SessionStore) {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path().join("sessions"));
    (dir, store)
}

#[tokio::test]
async fn append_batches_preserve_order() {
    let (_dir, store) = store();
    store
        .append("chat", &[SessionEntry::user("A"), SessionEntry::assistant("B")])
        .await
        .unwrap();
    store.append("chat", &[SessionEntry::user("C")]).await.unwrap();

    let contents: Vec<String> = store
        .load("chat")
        .await
        .into_iter()
        .map(|e| e.content)
        .collect();
    assert_eq!(contents, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn list_is_newest_first_with_sizes() {
    let (_dir, store) = store();
    store.append("older", &[SessionEntry::user("x")]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    store
        .append("newer", &[SessionEntry::user("y"), SessionEntry::assistant("z")])
        .await
        .unwrap();

    let sessions = store.list().await.unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["newer", "older"]);
    assert!(sessions[0].size_bytes > sessions[1].size_bytes);
    assert!(sessions[0].updated_at >= sessions[1].updated_at);
}

#[tokio::test]
async fn list_on_missing_dir_is_empty() {
    let (_dir, store) = store();
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn tool_entries_survive_reload() {
    let (_dir, store) = store();
    let entries = [
        SessionEntry::user("list files"),
        SessionEntry::tool_called("terminal", json!({"command": "ls"})),
        SessionEntry::tool_finished("terminal", json!({"command": "ls"}), "a.md\nb.md".into()),
        SessionEntry::assistant("Two files."),
    ];
    store.save("t", &entries).await.unwrap();

    let loaded = store.load("t").await;
    assert_eq!(loaded, entries);
    assert_eq!(loaded[2].kind, EntryKind::Tool);
    assert_eq!(loaded[2].tool.as_ref().unwrap().output.as_deref(), Some("a.md\nb.md"));

    let history = store.to_chat_messages("t", 30).await;
    let roles: Vec<&str> = history.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant"]);
}

#[tokio::test]
async fn ids_share_a_file_after_normalization() {
    let (_dir, store) = store();
    store.append("my session!", &[SessionEntry::user("one")]).await.unwrap();
    store.append("my-session", &[SessionEntry::user("two")]).await.unwrap();
    assert_eq!(store.path("my session!"), store.path("my-session"));
    assert_eq!(store.load("my-session").await.len(), 2);
}
