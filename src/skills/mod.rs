//! Skill discovery and the `SKILLS_SNAPSHOT.md` catalogue.
//!
//! A skill is a directory under `skills/` containing a `SKILL.md` whose
//! optional YAML front-matter carries `name` and `description`. The
//! snapshot lists every skill as XML so the model can find and read them
//! with the `read_file` tool.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::utils::relative_posix;

pub const SNAPSHOT_FILE: &str = "SKILLS_SNAPSHOT.md";

/// One discovered skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMeta {
    pub name: String,
    pub description: String,
    /// `SKILL.md` path relative to the backend root, `/`-separated.
    pub location: String,
}

/// YAML front-matter of a `SKILL.md`. `id` is accepted as an alias for
/// `name`.
#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default, alias = "id")]
    name: Option<serde_yaml::Value>,
    #[serde(default)]
    description: Option<serde_yaml::Value>,
}

fn yaml_text(value: Option<&serde_yaml::Value>) -> String {
    match value {
        Some(serde_yaml::Value::String(s)) => s.trim().to_string(),
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        Some(serde_yaml::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Split a `SKILL.md` into its YAML front-matter and markdown body.
pub fn parse_skill_md(content: &str) -> anyhow::Result<(String, String)> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("---") {
        bail!("SKILL.md has no YAML front-matter")
    }
    let after_open = &trimmed[3..];
    let after_open = after_open
        .strip_prefix("\r\n")
        .or_else(|| after_open.strip_prefix('\n'))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or_else(|| anyhow::anyhow!("missing closing --- in SKILL.md front-matter"))?;

    let yaml = after_open[..close_pos].to_string();
    let rest = &after_open[close_pos + 4..];
    let body = rest.strip_prefix('\n').unwrap_or(rest).to_string();
    Ok((yaml, body))
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render the `<available_skills>` block.
pub fn render_snapshot(skills: &[SkillMeta]) -> String {
    let mut lines = vec!["<available_skills>".to_string()];
    for skill in skills {
        lines.push("  <skill>".into());
        lines.push(format!("    <name>{}</name>", escape_xml(&skill.name)));
        lines.push(format!(
            "    <description>{}</description>",
            escape_xml(&skill.description)
        ));
        lines.push(format!(
            "    <location>{}</location>",
            escape_xml(&skill.location)
        ));
        lines.push("  </skill>".into());
    }
    lines.push("</available_skills>".into());
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct SkillScanner {
    skills_dir: PathBuf,
    workspace_dir: PathBuf,
    root_dir: PathBuf,
}

impl SkillScanner {
    pub fn new(
        skills_dir: impl Into<PathBuf>,
        workspace_dir: impl Into<PathBuf>,
        root_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            skills_dir: skills_dir.into(),
            workspace_dir: workspace_dir.into(),
            root_dir: root_dir.into(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.workspace_dir.join(SNAPSHOT_FILE)
    }

    /// Every `skills/*/SKILL.md`, ordered by directory name.
    pub async fn scan(&self) -> anyhow::Result<Vec<SkillMeta>> {
        let mut rd = match tokio::fs::read_dir(&self.skills_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read skills dir {}", self.skills_dir.display()))
            }
        };

        let mut manifests = Vec::new();
        while let Some(entry) = rd.next_entry().await.context("read skills dir entry")? {
            let manifest = entry.path().join("SKILL.md");
            if manifest.is_file() {
                manifests.push(manifest);
            }
        }
        manifests.sort();

        let mut skills = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            let text = tokio::fs::read_to_string(&manifest)
                .await
                .with_context(|| format!("read {}", manifest.display()))?;
            skills.push(self.describe(&manifest, &text));
        }
        Ok(skills)
    }

    fn describe(&self, manifest: &Path, text: &str) -> SkillMeta {
        let front = match parse_skill_md(text) {
            Ok((yaml, _body)) => serde_yaml::from_str::<FrontMatter>(&yaml).unwrap_or_else(|e| {
                warn!(path = %manifest.display(), error = %e, "invalid SKILL.md front-matter");
                FrontMatter::default()
            }),
            Err(e) => {
                debug!(path = %manifest.display(), error = %e, "SKILL.md without front-matter");
                FrontMatter::default()
            }
        };

        let dir_name = manifest
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = Some(yaml_text(front.name.as_ref()))
            .filter(|n| !n.is_empty())
            .unwrap_or(dir_name);

        SkillMeta {
            name,
            description: yaml_text(front.description.as_ref()),
            location: relative_posix(manifest, &self.root_dir),
        }
    }

    /// Rescan skills and rewrite the snapshot file. Returns its content.
    pub async fn refresh_snapshot(&self) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.workspace_dir)
            .await
            .context("create workspace dir")?;
        let skills = self.scan().await?;
        let snapshot = render_snapshot(&skills);
        let path = self.snapshot_path();
        tokio::fs::write(&path, &snapshot)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        info!(skills = skills.len(), "skills snapshot refreshed");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skill_md_valid() {
        let (yaml, body) = parse_skill_md("---\nname: weather\n---\n# Weather\n").unwrap();
        assert_eq!(yaml, "name: weather");
        assert_eq!(body, "# Weather\n");
    }

    #[test]
    fn parse_skill_md_no_frontmatter() {
        assert!(parse_skill_md("# Just markdown").is_err());
        assert!(parse_skill_md("---\nname: x\nno close").is_err());
    }

    #[test]
    fn snapshot_is_escaped() {
        let xml = render_snapshot(&[SkillMeta {
            name: "a&b".into(),
            description: "<desc>".into(),
            location: "skills/a/SKILL.md".into(),
        }]);
        assert_eq!(
            xml,
            "<available_skills>\n  <skill>\n    <name>a&amp;b</name>\n    \
             <description>&lt;desc&gt;</description>\n    \
             <location>skills/a/SKILL.md</location>\n  </skill>\n</available_skills>"
        );
        assert_eq!(render_snapshot(&[]), "<available_skills>\n</available_skills>");
    }

    #[tokio::test]
    async fn refresh_writes_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let skills = root.path().join("skills");
        std::fs::create_dir_all(skills.join("weather")).unwrap();
        std::fs::create_dir_all(skills.join("alpha")).unwrap();
        std::fs::create_dir_all(skills.join("empty")).unwrap();
        std::fs::write(
            skills.join("weather/SKILL.md"),
            "---\nname: get_weather\ndescription: Look up the forecast\n---\nbody",
        )
        .unwrap();
        std::fs::write(skills.join("alpha/SKILL.md"), "no front matter").unwrap();

        let scanner = SkillScanner::new(&skills, root.path().join("workspace"), root.path());
        let found = scanner.scan().await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "alpha");
        assert_eq!(found[0].description, "");
        assert_eq!(found[1].name, "get_weather");
        assert_eq!(found[1].location, "skills/weather/SKILL.md");

        let snapshot = scanner.refresh_snapshot().await.unwrap();
        let on_disk = std::fs::read_to_string(scanner.snapshot_path()).unwrap();
        assert_eq!(snapshot, on_disk);
        assert!(on_disk.contains("<name>get_weather</name>"));
    }

    #[tokio::test]
    async fn missing_skills_dir_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let scanner = SkillScanner::new(
            root.path().join("skills"),
            root.path().join("workspace"),
            root.path(),
        );
        assert!(scanner.scan().await.unwrap().is_empty());
    }
}
