//! Shared utility helpers.

/// Marker appended to text that was cut to fit a character budget.
pub const TRUNCATED_MARKER: &str = "...[truncated]";

/// Cap `text` at `max_chars` characters.
///
/// Text that already fits is returned unchanged. Longer text keeps a prefix
/// followed by [`TRUNCATED_MARKER`] so the result is exactly `max_chars`
/// characters long. Counting is by `char`, never by byte.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATED_MARKER.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATED_MARKER);
    out
}

/// Render a path relative to `base` with `/` separators.
///
/// Falls back to the full path when `path` is not under `base`.
pub fn relative_posix(path: &std::path::Path, base: &std::path::Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_with_marker("hello", 2000), "hello");
        let exact = "x".repeat(2000);
        assert_eq!(truncate_with_marker(&exact, 2000), exact);
    }

    #[test]
    fn long_text_is_cut_to_exact_length() {
        let long = "y".repeat(5000);
        let out = truncate_with_marker(&long, 2000);
        assert_eq!(out.chars().count(), 2000);
        assert!(out.ends_with(TRUNCATED_MARKER));
        assert!(out.starts_with(&"y".repeat(1986)));
    }

    #[test]
    fn multibyte_text_counts_chars() {
        let long = "技".repeat(30);
        let out = truncate_with_marker(&long, 20);
        assert_eq!(out.chars().count(), 20);
        assert!(out.starts_with("技技技技技技"));
    }

    #[test]
    fn relative_posix_joins_with_slashes() {
        let base = Path::new("/srv/backend");
        let path = base.join("skills").join("weather").join("SKILL.md");
        assert_eq!(relative_posix(&path, base), "skills/weather/SKILL.md");
    }
}
