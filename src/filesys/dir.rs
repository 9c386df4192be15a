//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::SyncError;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), SyncError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// List `*.json` files in the directory, in directory-read order.
    /// Dotfiles (e.g. this crate's own `.sync-registry.json` sidecar) are
    /// skipped — they are never workflow records, and `Path::extension`
    /// would otherwise still report `json` for a name like
    /// `.sync-registry.json`.
    pub async fn list_json_files(&self) -> Result<Vec<PathBuf>, SyncError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_dotfile = path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('.'));
            if path.is_file() && !is_dotfile && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }

        Ok(files)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> crate::filesys::file::File {
        crate::filesys::file::File::new(self.path.join(name))
    }
}
