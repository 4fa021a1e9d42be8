//! File System Probe Abstraction
//!
//! Read-only view of the host filesystem. Relocation matching asks the probe
//! which recorded paths still resolve and which files live under the search
//! roots; it never opens or modifies files.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// Filesystem probe trait
///
/// Abstracts the handful of read-only queries the engine needs:
/// - Desktop: direct filesystem access through `tokio::fs`
/// - Sandboxed hosts: bookmarked folders or document-picker grants
/// - Tests: in-memory maps
///
/// # Example
///
/// ```ignore
/// use bridge_traits::filesystem::FileSystemProbe;
///
/// async fn still_there(probe: &dyn FileSystemProbe, location: &str) -> bool {
///     probe.exists(std::path::Path::new(location)).await.unwrap_or(false)
/// }
/// ```
#[async_trait]
pub trait FileSystemProbe: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// List the immediate entries of a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Check whether `path` is a directory
    ///
    /// Missing paths are reported as `false` rather than as an error.
    async fn is_directory(&self, path: &Path) -> Result<bool> {
        if !self.exists(path).await? {
            return Ok(false);
        }
        Ok(self.metadata(path).await?.is_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;
    use mockall::mock;

    mock! {
        pub Probe {}

        // `is_directory` is left out so the trait's default runs.
        #[async_trait]
        impl FileSystemProbe for Probe {
            async fn exists(&self, path: &Path) -> Result<bool>;
            async fn metadata(&self, path: &Path) -> Result<FileMetadata>;
            async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
        }
    }

    fn entry(is_directory: bool) -> FileMetadata {
        FileMetadata {
            size: if is_directory { 0 } else { 4_096 },
            modified_at: Some(1_700_000_000),
            is_directory,
        }
    }

    #[tokio::test]
    async fn test_is_directory_default() {
        let mut probe = MockProbe::new();
        probe
            .expect_exists()
            .returning(|path| Ok(path != Path::new("/gone")));
        probe
            .expect_metadata()
            .times(2)
            .returning(|path| Ok(entry(path == Path::new("/music"))));

        assert!(probe.is_directory(Path::new("/music")).await.unwrap());
        assert!(!probe.is_directory(Path::new("/music/song.mp3")).await.unwrap());
        assert!(!probe.is_directory(Path::new("/gone")).await.unwrap());
    }

    #[tokio::test]
    async fn test_is_directory_propagates_metadata_errors() {
        let mut probe = MockProbe::new();
        probe.expect_exists().returning(|_| Ok(true));
        probe
            .expect_metadata()
            .returning(|path| Err(BridgeError::NotFound(path.display().to_string())));

        assert!(probe.is_directory(Path::new("/racy")).await.is_err());
    }
}
