//! Platform runtime abstraction for modpin.
//!
//! This crate defines the [`Runtime`] trait that abstracts the filesystem
//! operations the registry core depends on: directory listing, file reads and
//! writes, renames, and metadata lookups. The dependency-versioning engine
//! consumes it as an `Arc<dyn Runtime>` so that tests can substitute an
//! implementation without touching the real filesystem.
//!
//! Two implementations ship with the crate:
//!
//! - [`NativeRuntime`] - backed by `tokio::fs`, used in production
//! - [`test_utils::TestRuntime`] - backed by `std::fs`, for test suites that
//!   operate on a `tempfile::TempDir`

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub mod native;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use native::NativeRuntime;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur during runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Other runtime error.
    #[error("Runtime error: {0}")]
    Other(String),
}

impl RuntimeError {
    /// Maps an `std::io::Error` for `path` into the closest runtime error.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::FileNotFound(path.to_path_buf())
        } else {
            RuntimeError::Io(err.to_string())
        }
    }
}

/// File metadata.
#[derive(Debug, Clone, Copy)]
pub struct FileMetadata {
    /// File size in bytes.
    pub size: u64,
    /// Whether this is a directory.
    pub is_dir: bool,
    /// Whether this is a regular file.
    pub is_file: bool,
}

/// A single directory entry, as returned by [`Runtime::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// The entry's file name (not a full path).
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            is_dir,
        }
    }
}

/// Platform runtime trait.
///
/// Implementations provide the filesystem operations the versioning engine
/// needs. All methods take absolute or caller-relative paths; the runtime does
/// no path resolution of its own.
#[async_trait]
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Read a file's bytes.
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Write bytes to a file, replacing any previous content.
    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()>;

    /// List a directory's entries.
    async fn read_dir(&self, path: &Path) -> RuntimeResult<Vec<DirEntry>>;

    /// Rename a file or directory.
    async fn rename(&self, from: &Path, to: &Path) -> RuntimeResult<()>;

    /// Get file metadata.
    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata>;
}
