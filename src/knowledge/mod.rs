//! Local knowledge lookup behind the `search_knowledge_base` tool.
//!
//! [`KeywordKnowledge`] is a plain scan: documents under the knowledge
//! directory are split into paragraphs and a paragraph matches when it
//! contains any query term. Results keep file order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::utils::truncate_with_marker;

/// Longest text returned by a search, in characters.
pub const SEARCH_OUTPUT_CAP: usize = 6000;

pub const EMPTY_QUERY: &str = "Query is empty.";
pub const UNAVAILABLE: &str = "Knowledge base unavailable or empty.";
pub const NO_MATCHES: &str = "No relevant knowledge found.";

const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";
const DOC_EXTENSIONS: &[&str] = &["md", "txt"];

/// Retrieval over the local knowledge directory.
///
/// Never fails; problems are reported through the sentinel strings.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> String;
}

#[derive(Debug, Clone, PartialEq)]
struct Passage {
    source: PathBuf,
    text: String,
}

/// Paragraph index built lazily on first use.
pub struct KeywordKnowledge {
    knowledge_dir: PathBuf,
    passages: OnceCell<Vec<Passage>>,
}

impl KeywordKnowledge {
    pub fn new(knowledge_dir: impl Into<PathBuf>) -> Self {
        Self {
            knowledge_dir: knowledge_dir.into(),
            passages: OnceCell::new(),
        }
    }

    /// Load the documents now instead of on the first search.
    pub async fn initialize(&self) -> usize {
        self.passages().await.len()
    }

    async fn passages(&self) -> &[Passage] {
        self.passages
            .get_or_init(|| async {
                let passages = load_passages(&self.knowledge_dir).await;
                info!(
                    dir = %self.knowledge_dir.display(),
                    passages = passages.len(),
                    "knowledge base loaded"
                );
                passages
            })
            .await
    }
}

#[async_trait]
impl KnowledgeBase for KeywordKnowledge {
    async fn search(&self, query: &str, top_k: usize) -> String {
        let query = query.trim();
        if query.is_empty() {
            return EMPTY_QUERY.to_string();
        }
        let passages = self.passages().await;
        if passages.is_empty() {
            return UNAVAILABLE.to_string();
        }

        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let mut merged: Vec<&str> = Vec::new();
        for passage in passages {
            if merged.len() >= top_k {
                break;
            }
            let lower = passage.text.to_lowercase();
            if terms.iter().any(|t| lower.contains(t.as_str()))
                && !merged.contains(&passage.text.as_str())
            {
                debug!(source = %passage.source.display(), "knowledge passage matched");
                merged.push(&passage.text);
            }
        }

        if merged.is_empty() {
            return NO_MATCHES.to_string();
        }
        truncate_with_marker(&merged.join(PASSAGE_SEPARATOR), SEARCH_OUTPUT_CAP)
    }
}

/// Read every document under `dir` and split it into paragraphs.
async fn load_passages(dir: &Path) -> Vec<Passage> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut rd = match tokio::fs::read_dir(&current).await {
            Ok(rd) => rd,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %current.display(), error = %e, "cannot read knowledge dir");
                }
                continue;
            }
        };
        while let Ok(Some(entry)) = rd.next_entry().await {
            let path = entry.path();
            match entry.file_type().await {
                Ok(ft) if ft.is_dir() => pending.push(path),
                Ok(ft) if ft.is_file() => {
                    let is_doc = path
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(|e| DOC_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                        .unwrap_or(false);
                    if is_doc {
                        files.push(path);
                    }
                }
                _ => {}
            }
        }
    }
    files.sort();

    let mut passages = Vec::new();
    for file in files {
        let text = match tokio::fs::read_to_string(&file).await {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "skipping unreadable knowledge file");
                continue;
            }
        };
        let normalized = text.replace("\r\n", "\n");
        passages.extend(
            normalized
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| Passage {
                    source: file.clone(),
                    text: p.to_string(),
                }),
        );
    }
    passages
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn kb_with(files: &[(&str, &str)]) -> (tempfile::TempDir, KeywordKnowledge) {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            let path = dir.path().join(name);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(path, body).await.unwrap();
        }
        let kb = KeywordKnowledge::new(dir.path());
        (dir, kb)
    }

    #[tokio::test]
    async fn sentinels() {
        let (_dir, kb) = kb_with(&[]).await;
        assert_eq!(kb.search("   ", 4).await, EMPTY_QUERY);
        assert_eq!(kb.search("rust", 4).await, UNAVAILABLE);

        let (_dir, kb) = kb_with(&[("a.md", "alpha\n\nbeta")]).await;
        assert_eq!(kb.search("gamma", 4).await, NO_MATCHES);
    }

    #[tokio::test]
    async fn matches_in_file_order_and_dedups() {
        let (_dir, kb) = kb_with(&[
            ("a.md", "Rust ownership\n\nunrelated\n\nrust ownership"),
            ("nested/b.txt", "Rust ownership"),
            ("c.pdf", "rust binary"),
        ])
        .await;
        let out = kb.search("RUST", 4).await;
        assert_eq!(out, "Rust ownership\n\n---\n\nrust ownership");
    }

    #[tokio::test]
    async fn respects_top_k_and_cap() {
        let long = format!("{}\n\n{}", "term ".repeat(1000), "terms ".repeat(1000));
        let (_dir, kb) = kb_with(&[("big.md", long.as_str())]).await;
        let one = kb.search("term", 1).await;
        assert!(!one.contains("---"));
        let both = kb.search("term", 4).await;
        assert_eq!(both.chars().count(), SEARCH_OUTPUT_CAP);
        assert!(both.ends_with(crate::utils::TRUNCATED_MARKER));
    }
}
