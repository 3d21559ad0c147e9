//! Test utilities for modpin runtimes.
//!
//! Provides [`TestRuntime`], a `std::fs`-backed [`Runtime`] implementation
//! meant to be pointed at a `tempfile::TempDir`. Rather than mocking
//! filesystem operations, tests exercise real I/O in a throwaway directory,
//! which keeps path handling and rename behavior honest.

// Test utilities are allowed to use std::fs since they only run on native platforms
#![allow(clippy::disallowed_methods)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{DirEntry, FileMetadata, Runtime, RuntimeError, RuntimeResult};

/// Simple test runtime that wraps `std::fs`.
#[derive(Debug, Default, Clone)]
pub struct TestRuntime {
    root: PathBuf,
}

impl TestRuntime {
    /// Create a new test runtime rooted at `root`. The root is informational;
    /// operations use the paths they are given.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Runtime for TestRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        std::fs::write(path, content).map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn read_dir(&self, path: &Path) -> RuntimeResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path).map_err(|e| RuntimeError::from_io(path, e))? {
            let entry = entry.map_err(|e| RuntimeError::Io(e.to_string()))?;
            let file_type = entry
                .file_type()
                .map_err(|e| RuntimeError::Io(e.to_string()))?;
            entries.push(DirEntry::new(
                entry.file_name().to_string_lossy().into_owned(),
                file_type.is_dir(),
            ));
        }
        Ok(entries)
    }

    async fn rename(&self, from: &Path, to: &Path) -> RuntimeResult<()> {
        std::fs::rename(from, to).map_err(|e| RuntimeError::from_io(from, e))
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let metadata = std::fs::metadata(path).map_err(|e| RuntimeError::from_io(path, e))?;
        Ok(FileMetadata {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            is_file: metadata.is_file(),
        })
    }
}
