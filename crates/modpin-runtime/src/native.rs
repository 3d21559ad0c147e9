//! Native runtime backed by `tokio::fs`.

use std::path::Path;

use async_trait::async_trait;

use crate::{DirEntry, FileMetadata, Runtime, RuntimeError, RuntimeResult};

/// Production runtime. Delegates every operation to `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRuntime;

impl NativeRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runtime for NativeRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn read_dir(&self, path: &Path) -> RuntimeResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))?;

        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| RuntimeError::Io(e.to_string()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| RuntimeError::Io(e.to_string()))?;
            entries.push(DirEntry::new(
                entry.file_name().to_string_lossy().into_owned(),
                file_type.is_dir(),
            ));
        }

        Ok(entries)
    }

    async fn rename(&self, from: &Path, to: &Path) -> RuntimeResult<()> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| RuntimeError::from_io(from, e))
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))?;
        Ok(FileMetadata {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            is_file: metadata.is_file(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_write_round_trip() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        let runtime = NativeRuntime::new();

        runtime.write_file(&path, b"hello").await.unwrap();
        let content = runtime.read_file(&path).await.unwrap();
        assert_eq!(content, b"hello");

        let meta = runtime.metadata(&path).await.unwrap();
        assert!(meta.is_file);
        assert!(!meta.is_dir);
        assert_eq!(meta.size, 5);
    }

    #[tokio::test]
    async fn read_dir_reports_entry_kinds() {
        let temp = tempfile::TempDir::new().unwrap();
        let runtime = NativeRuntime::new();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("a.go"), b"package a\n").unwrap();

        let mut entries = runtime.read_dir(temp.path()).await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], DirEntry::new("a.go", false));
        assert_eq!(entries[1], DirEntry::new("sub", true));
    }

    #[tokio::test]
    async fn missing_file_maps_to_not_found() {
        let temp = tempfile::TempDir::new().unwrap();
        let runtime = NativeRuntime::new();
        let err = runtime
            .read_file(&temp.path().join("nope.go"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::FileNotFound(_)));
    }
}
