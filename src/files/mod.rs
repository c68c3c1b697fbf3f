//! Sandboxed file access under the backend root.
//!
//! Reads may target any file below the root. Writes are further limited to
//! a fixed set of top-level directories.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::debug;

/// Top-level directories that accept writes.
pub const WRITABLE_PREFIXES: &[&str] = &["memory/", "skills/", "workspace/", "sessions/"];

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("path is required")]
    Empty,
    #[error("absolute paths are not allowed: {0}")]
    Absolute(String),
    #[error("path traversal is not allowed: {0}")]
    Traversal(String),
    #[error("path escapes backend root: {0}")]
    Escape(String),
    #[error("writes are only allowed under memory/, skills/, workspace/ or sessions/: {0}")]
    NotWritable(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FileError {
    /// Errors caused by the requested path rather than the filesystem.
    pub fn is_rejected_path(&self) -> bool {
        matches!(
            self,
            FileError::Empty
                | FileError::Absolute(_)
                | FileError::Traversal(_)
                | FileError::Escape(_)
                | FileError::NotWritable(_)
        )
    }
}

/// Canonicalize `p`, allowing a tail of components that do not exist yet.
///
/// The deepest existing ancestor is canonicalized and the missing
/// components are re-appended.
pub(crate) fn canon_or_resolve(p: &Path) -> std::io::Result<PathBuf> {
    if p.exists() {
        return p.canonicalize();
    }
    let unresolvable = || {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("cannot resolve path: {}", p.display()),
        )
    };
    let mut existing = p.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        tail.push(existing.file_name().ok_or_else(unresolvable)?.to_os_string());
        existing = existing.parent().ok_or_else(unresolvable)?.to_path_buf();
    }
    let mut resolved = existing.canonicalize()?;
    for component in tail.into_iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}

/// Normalize a client path: trimmed, forward slashes, no leading `./`.
fn clean_relative(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let mut rest = unified.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

#[derive(Debug, Clone)]
pub struct FileService {
    root_dir: PathBuf,
}

impl FileService {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Resolve a client-supplied relative path to a location under the root.
    pub fn resolve_safe_path(&self, raw: &str) -> Result<PathBuf, FileError> {
        let rel = clean_relative(raw);
        if rel.is_empty() {
            return Err(FileError::Empty);
        }
        if rel.starts_with('/') || Path::new(&rel).is_absolute() {
            return Err(FileError::Absolute(rel));
        }
        if Path::new(&rel)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(FileError::Traversal(rel));
        }

        let root = self.root_dir.canonicalize()?;
        let resolved = canon_or_resolve(&root.join(&rel))?;
        if !resolved.starts_with(&root) {
            return Err(FileError::Escape(rel));
        }
        Ok(resolved)
    }

    pub fn can_write(&self, raw: &str) -> bool {
        let rel = clean_relative(raw);
        WRITABLE_PREFIXES.iter().any(|prefix| rel.starts_with(prefix))
    }

    pub async fn read_text(&self, raw: &str) -> Result<String, FileError> {
        let path = self.resolve_safe_path(raw)?;
        if !path.is_file() {
            return Err(FileError::NotFound(clean_relative(raw)));
        }
        Ok(fs::read_to_string(&path).await?)
    }

    /// Write `content`, creating parent directories as needed.
    pub async fn write_text(&self, raw: &str, content: &str) -> Result<PathBuf, FileError> {
        if !self.can_write(raw) {
            return Err(FileError::NotWritable(clean_relative(raw)));
        }
        let path = self.resolve_safe_path(raw)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content).await?;
        debug!(path = %path.display(), bytes = content.len(), "file written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (tempfile::TempDir, FileService) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("workspace")).unwrap();
        let svc = FileService::new(dir.path());
        (dir, svc)
    }

    #[test]
    fn rejects_bad_paths() {
        let (_dir, svc) = service();
        assert!(matches!(svc.resolve_safe_path("  "), Err(FileError::Empty)));
        assert!(matches!(svc.resolve_safe_path("/etc/passwd"), Err(FileError::Absolute(_))));
        assert!(matches!(
            svc.resolve_safe_path("workspace/../../x"),
            Err(FileError::Traversal(_))
        ));
        assert!(matches!(svc.resolve_safe_path("..\\x"), Err(FileError::Traversal(_))));
    }

    #[test]
    fn resolves_missing_files_under_root() {
        let (dir, svc) = service();
        let p = svc.resolve_safe_path("./workspace/new/dir/file.md").unwrap();
        assert!(p.starts_with(dir.path().canonicalize().unwrap()));
        assert!(p.ends_with("workspace/new/dir/file.md"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let (dir, svc) = service();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("workspace").join("out")).unwrap();
        let err = svc.resolve_safe_path("workspace/out/secret").unwrap_err();
        assert!(matches!(err, FileError::Escape(_)));
        assert!(err.is_rejected_path());
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, svc) = service();
        svc.write_text("memory/MEMORY.md", "remember").await.unwrap();
        assert_eq!(svc.read_text("memory/MEMORY.md").await.unwrap(), "remember");
    }

    #[tokio::test]
    async fn writes_outside_allowed_dirs_fail() {
        let (_dir, svc) = service();
        let err = svc.write_text("config.yaml", "x").await.unwrap_err();
        assert!(matches!(err, FileError::NotWritable(_)));
        assert!(!svc.can_write("knowledge/a.md"));
        assert!(svc.can_write("skills/x/SKILL.md"));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, svc) = service();
        let err = svc.read_text("workspace/none.md").await.unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
        assert!(!err.is_rejected_path());
    }
}
