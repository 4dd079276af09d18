//! Summary artifact storage
//!
//! One markdown file per session id under the summaries directory. The
//! artifact is the durable product of the summarization step; the index
//! stores only a pointer to it. A metadata footer (HTML comment) carries
//! the session id and git ref so an artifact round-trips through
//! [`SummaryStore::load`] without external state.

use crate::error::{Error, Result};
use crate::types::Summary;
use std::fs;
use std::path::{Path, PathBuf};

const FOOTER_PREFIX: &str = "<!-- afterpaths: ";

/// Directory-backed store of summary artifacts.
pub struct SummaryStore {
    dir: PathBuf,
}

impl SummaryStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the artifact for a session id.
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.md", session_id))
    }

    /// Whether an artifact exists for this session id.
    pub fn exists(&self, session_id: &str) -> bool {
        self.path_for(session_id).exists()
    }

    /// Persist a summary atomically (write to temp, then rename).
    ///
    /// Overwrites any existing artifact for the same session id; the index
    /// gates when that is allowed. Returns the artifact path.
    pub fn save(&self, summary: &Summary) -> Result<PathBuf> {
        let path = self.path_for(&summary.session_id);
        let tmp = path.with_extension("md.tmp");

        let mut content = summary.text.trim_end().to_string();
        content.push_str("\n\n");
        content.push_str(&render_footer(summary));
        content.push('\n');

        fs::write(&tmp, &content)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!(session_id = %summary.session_id, path = %path.display(), "Saved summary");
        Ok(path)
    }

    /// Load the artifact for a session id.
    ///
    /// Fails with `Io` (not found) when no artifact exists. A file without
    /// a metadata footer is accepted; the id comes from the file name.
    pub fn load(&self, session_id: &str) -> Result<Summary> {
        let path = self.path_for(session_id);
        let raw = fs::read_to_string(&path)?;
        Ok(parse_artifact(session_id, &raw))
    }
}

fn render_footer(summary: &Summary) -> String {
    match &summary.git_ref {
        Some(git_ref) => format!(
            "{}session={} git_ref={} -->",
            FOOTER_PREFIX, summary.session_id, git_ref
        ),
        None => format!("{}session={} -->", FOOTER_PREFIX, summary.session_id),
    }
}

fn parse_artifact(session_id: &str, raw: &str) -> Summary {
    let mut git_ref = None;
    let mut text_end = raw.len();

    if let Some(pos) = raw.rfind(FOOTER_PREFIX) {
        let footer = &raw[pos..];
        if let Some(body) = footer
            .strip_prefix(FOOTER_PREFIX)
            .and_then(|s| s.trim_end().strip_suffix("-->"))
        {
            for field in body.split_whitespace() {
                if let Some(value) = field.strip_prefix("git_ref=") {
                    git_ref = Some(value.to_string());
                }
            }
            text_end = pos;
        }
    }

    Summary {
        session_id: session_id.to_string(),
        git_ref,
        text: raw[..text_end].trim_end().to_string(),
    }
}

/// Convenience: load a summary from an explicit artifact path, deriving the
/// session id from the file stem. Used when the index entry carries a
/// `summary_ref` rather than going through a store.
pub fn load_artifact(path: &Path) -> Result<Summary> {
    let session_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config(format!("bad summary path: {}", path.display())))?;
    let raw = fs::read_to_string(path)?;
    Ok(parse_artifact(session_id, &raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, git_ref: Option<&str>, text: &str) -> Summary {
        Summary {
            session_id: id.to_string(),
            git_ref: git_ref.map(String::from),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SummaryStore::open(dir.path()).unwrap();

        let original = summary(
            "s-1",
            Some("abc1234"),
            "## Gotchas\n\n- JWT rotation race condition",
        );
        let path = store.save(&original).unwrap();
        assert!(path.ends_with("s-1.md"));
        assert!(store.exists("s-1"));

        let loaded = store.load("s-1").unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_round_trip_without_git_ref() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SummaryStore::open(dir.path()).unwrap();

        let original = summary("s-2", None, "Nothing notable.");
        store.save(&original).unwrap();
        assert_eq!(store.load("s-2").unwrap(), original);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SummaryStore::open(dir.path()).unwrap();

        store.save(&summary("s-1", None, "first")).unwrap();
        store.save(&summary("s-1", Some("def5678"), "second")).unwrap();

        let loaded = store.load("s-1").unwrap();
        assert_eq!(loaded.text, "second");
        assert_eq!(loaded.git_ref.as_deref(), Some("def5678"));
    }

    #[test]
    fn test_load_missing_is_err() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SummaryStore::open(dir.path()).unwrap();
        assert!(store.load("ghost").is_err());
        assert!(!store.exists("ghost"));
    }

    #[test]
    fn test_footerless_file_accepted() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SummaryStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("manual.md"), "Hand-written notes.\n").unwrap();

        let loaded = store.load("manual").unwrap();
        assert_eq!(loaded.session_id, "manual");
        assert_eq!(loaded.git_ref, None);
        assert_eq!(loaded.text, "Hand-written notes.");
    }

    #[test]
    fn test_load_artifact_by_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SummaryStore::open(dir.path()).unwrap();
        let path = store.save(&summary("s-9", Some("main"), "body")).unwrap();

        let loaded = load_artifact(&path).unwrap();
        assert_eq!(loaded.session_id, "s-9");
        assert_eq!(loaded.git_ref.as_deref(), Some("main"));
    }
}
