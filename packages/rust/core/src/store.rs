//! One-file-per-page summary store.
//!
//! A summary lives at `<root>/<sanitized title>.txt`. Files are created once
//! and never rewritten; their existence is what marks a page as harvested.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use tracing::{debug, info};

use sowscribe_shared::{Result, SowscribeError};

/// Replace every non-alphanumeric character with `_`.
///
/// Distinct titles may collide (`A/B` and `A_B`); the first one harvested wins.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// What [`SummaryStore::save`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    AlreadyExists(PathBuf),
}

/// Directory of summary files.
#[derive(Debug, Clone)]
pub struct SummaryStore {
    root: PathBuf,
}

impl SummaryStore {
    /// Open the store, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| SowscribeError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Path of the summary file for `title`.
    pub fn path_for(&self, title: &str) -> PathBuf {
        self.root.join(format!("{}.txt", sanitize_title(title)))
    }

    /// Whether a summary for `title` is already on disk.
    pub fn exists(&self, title: &str) -> bool {
        self.path_for(title).exists()
    }

    /// Write `content` for `title` unless a file is already there.
    ///
    /// The check and the write are one `create_new` open, so an existing
    /// file is never truncated.
    pub fn save(&self, title: &str, content: &str) -> Result<SaveOutcome> {
        let path = self.path_for(title);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "summary already exists");
                return Ok(SaveOutcome::AlreadyExists(path));
            }
            Err(e) => return Err(SowscribeError::io(&path, e)),
        };

        file.write_all(content.as_bytes())
            .map_err(|e| SowscribeError::io(&path, e))?;

        info!(path = %path.display(), bytes = content.len(), "saved summary");
        Ok(SaveOutcome::Saved(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sowscribe-store-test-{}", uuid::Uuid::now_v7()))
    }

    #[test]
    fn sanitize_replaces_non_alphanumerics() {
        assert_eq!(sanitize_title("SOW #1"), "SOW__1");
        assert_eq!(sanitize_title("MSA 2023"), "MSA_2023");
        assert_eq!(sanitize_title("Café-Ölfeld"), "Café_Ölfeld");
        assert_eq!(sanitize_title(""), "");
    }

    #[test]
    fn sanitize_collisions_are_accepted() {
        assert_eq!(sanitize_title("A/B"), sanitize_title("A_B"));
    }

    #[test]
    fn save_creates_once_and_never_overwrites() {
        let dir = temp_dir();
        let store = SummaryStore::open(&dir).unwrap();

        assert!(!store.exists("SOW #1"));
        let first = store.save("SOW #1", "- Customer: ACME").unwrap();
        assert_eq!(first, SaveOutcome::Saved(dir.join("SOW__1.txt")));
        assert!(store.exists("SOW #1"));

        let second = store.save("SOW #1", "something else").unwrap();
        assert_eq!(second, SaveOutcome::AlreadyExists(dir.join("SOW__1.txt")));

        let on_disk = std::fs::read_to_string(dir.join("SOW__1.txt")).unwrap();
        assert_eq!(on_disk, "- Customer: ACME");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn colliding_titles_share_one_file() {
        let dir = temp_dir();
        let store = SummaryStore::open(&dir).unwrap();

        store.save("A/B", "first").unwrap();
        assert!(store.exists("A_B"));
        assert!(matches!(
            store.save("A_B", "second").unwrap(),
            SaveOutcome::AlreadyExists(_)
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_content_still_marks_page_harvested() {
        let dir = temp_dir();
        let store = SummaryStore::open(&dir).unwrap();

        store.save("Empty", "").unwrap();
        assert!(store.exists("Empty"));
        assert_eq!(std::fs::read_to_string(dir.join("Empty.txt")).unwrap(), "");

        std::fs::remove_dir_all(&dir).ok();
    }
}
