//! System prompt assembly from workspace markdown files.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::skills::SNAPSHOT_FILE;
use crate::utils::truncate_with_marker;

/// Cap on the assembled prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 50_000;

struct PromptFile {
    name: &'static str,
    path: PathBuf,
    max_chars: usize,
}

/// Builds the system prompt fresh for every turn.
///
/// Sections appear in a fixed order, each as `# <FILE>\n<content>`; a
/// missing file still contributes its heading.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    workspace_dir: PathBuf,
    memory_file: PathBuf,
}

impl PromptBuilder {
    pub fn new(workspace_dir: impl Into<PathBuf>, memory_file: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            memory_file: memory_file.into(),
        }
    }

    fn files(&self) -> [PromptFile; 6] {
        let ws = |name: &'static str, max_chars| PromptFile {
            name,
            path: self.workspace_dir.join(name),
            max_chars,
        };
        [
            ws(SNAPSHOT_FILE, 10_000),
            ws("SOUL.md", 9_000),
            ws("IDENTITY.md", 9_000),
            ws("USER.md", 7_000),
            ws("AGENTS.md", 7_000),
            PromptFile {
                name: "MEMORY.md",
                path: self.memory_file.clone(),
                max_chars: 5_000,
            },
        ]
    }

    pub async fn build(&self) -> String {
        let mut sections = Vec::with_capacity(6);
        for file in self.files() {
            let content = read_optional(&file.path).await;
            let content = truncate_with_marker(&content, file.max_chars);
            sections.push(format!("# {}\n{}", file.name, content));
        }
        truncate_with_marker(&sections.join("\n\n"), MAX_PROMPT_CHARS)
    }
}

async fn read_optional(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "prompt file unreadable, section left empty");
            String::new()
        }
    }
}
