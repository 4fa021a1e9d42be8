//! File System Probe Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    filesystem::{FileMetadata, FileSystemProbe},
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Tokio-based filesystem probe
///
/// Answers existence, metadata, and directory listing queries with
/// `tokio::fs`. Symlinks are followed, so a library that points into a
/// linked music folder resolves the same way the player would.
#[derive(Debug, Clone, Default)]
pub struct TokioFileSystemProbe {
    include_hidden: bool,
}

impl TokioFileSystemProbe {
    /// Create a probe that skips dot-files in directory listings
    pub fn new() -> Self {
        Self::default()
    }

    /// Also list hidden entries (names starting with `.`)
    pub fn with_hidden_entries(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    fn map_io_error(path: &Path, e: std::io::Error) -> BridgeError {
        if e.kind() == ErrorKind::NotFound {
            BridgeError::NotFound(path.display().to_string())
        } else {
            BridgeError::Io(e)
        }
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
    }
}

#[async_trait]
impl FileSystemProbe for TokioFileSystemProbe {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Self::map_io_error(path, e))?
        {
            let entry_path = entry.path();
            if !self.include_hidden && Self::is_hidden(&entry_path) {
                continue;
            }
            entries.push(entry_path);
        }

        // read_dir order is platform dependent
        entries.sort();

        debug!(count = entries.len(), "Listed directory");
        Ok(entries)
    }
}
