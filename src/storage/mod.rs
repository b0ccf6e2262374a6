//! Persistence layer.
//!
//! Strategies persist their own diagnostic text through a `FileRepository`.
//! Paths are relative, parents are created implicitly, and existing files are
//! overwritten. The spin ledger itself is never persisted.

pub mod history;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::types::SimError;

/// Abstraction over the file-repository service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Write `text` to the relative `path`, replacing any existing content.
    async fn save(&self, path: &str, text: &str) -> Result<(), SimError>;
}

/// Reject absolute paths and parent-directory escapes.
fn relative_path(path: &str) -> Result<PathBuf, SimError> {
    let candidate = Path::new(path);
    if path.trim().is_empty() {
        return Err(SimError::Storage("empty path".into()));
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(SimError::Storage(format!(
                    "path must be relative and stay inside the repository: {path}"
                )))
            }
        }
    }
    Ok(candidate.to_path_buf())
}

// ---------------------------------------------------------------------------
// Local directory
// ---------------------------------------------------------------------------

/// Repository rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileRepository for LocalRepository {
    async fn save(&self, path: &str, text: &str) -> Result<(), SimError> {
        let full = self.root.join(relative_path(path)?);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, text).await?;
        debug!(path = %full.display(), bytes = text.len(), "File saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// In-memory repository, for embedders that capture strategy output.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of a saved file.
    pub fn get(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FileRepository for MemoryRepository {
    async fn save(&self, path: &str, text: &str) -> Result<(), SimError> {
        relative_path(path)?;
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_string(), text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("spinlab_repo_{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_local_save_creates_parents() {
        let root = temp_root();
        let repo = LocalRepository::new(&root);
        assert_ok!(repo.save("logs/martingale/run.log", "hello").await);

        let written = std::fs::read_to_string(root.join("logs/martingale/run.log")).unwrap();
        assert_eq!(written, "hello");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_local_save_overwrites() {
        let root = temp_root();
        let repo = LocalRepository::new(&root);
        assert_ok!(repo.save("a.txt", "first").await);
        assert_ok!(repo.save("a.txt", "second").await);

        let written = std::fs::read_to_string(root.join("a.txt")).unwrap();
        assert_eq!(written, "second");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_local_rejects_escaping_paths() {
        let repo = LocalRepository::new(temp_root());
        assert!(repo.save("../outside.txt", "x").await.is_err());
        assert!(repo.save("/etc/passwd", "x").await.is_err());
        assert!(repo.save("", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_repository() {
        let repo = MemoryRepository::new();
        assert!(repo.is_empty());
        assert_ok!(repo.save("notes/a.txt", "one").await);
        assert_ok!(repo.save("notes/a.txt", "two").await);
        assert_eq!(repo.get("notes/a.txt").as_deref(), Some("two"));
        assert_eq!(repo.len(), 1);
        assert!(repo.save("../x", "y").await.is_err());
    }
}
