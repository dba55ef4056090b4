//! Process-lifetime backend over a concurrent map.

use crate::backend::{Backend, BackendConfig, BackendKind, FileStat};
use crate::error::StorageError;
use crate::path;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryFile {
    /// Path as first written, used for listings.
    path: String,
    content: Arc<[u8]>,
    modified: DateTime<Utc>,
}

/// A backend keeping whole files in memory.
///
/// Keys are normalized paths compared case-insensitively; directories are implicit and
/// exist while at least one file lives below them. No configuration keys are required.
#[derive(Debug)]
pub struct MemoryBackend {
    id: String,
    files: DashMap<String, MemoryFile>,
    initialized: AtomicBool,
}

impl MemoryBackend {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), files: DashMap::new(), initialized: AtomicBool::new(false) }
    }

    /// Number of stored files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    fn ensure_initialized(&self) -> Result<(), StorageError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::not_initialized(&self.id))
        }
    }

    fn key(&self, path: &str) -> Result<(String, String), StorageError> {
        self.ensure_initialized()?;
        let normalized = path::resolve_relative(path)?;
        let key = normalized.to_lowercase();
        Ok((normalized, key))
    }

    fn file_key(&self, path: &str) -> Result<(String, String), StorageError> {
        let (normalized, key) = self.key(path)?;
        if normalized.is_empty() {
            return Err(StorageError::InvalidPath {
                message: path.to_owned().into(),
                context: Some("Target must be a file".into()),
            });
        }
        Ok((normalized, key))
    }

    /// Segments of every stored path lying strictly below `dir`.
    fn descendants(&self, dir_key: &str) -> Vec<(Vec<String>, usize)> {
        let depth = if dir_key.is_empty() { 0 } else { dir_key.split('/').count() };
        let prefix = if dir_key.is_empty() { String::new() } else { format!("{dir_key}/") };

        self.files
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| (entry.value().path.split('/').map(str::to_owned).collect(), depth))
            .collect()
    }

    fn is_dir(&self, dir_key: &str) -> bool {
        dir_key.is_empty() || !self.descendants(dir_key).is_empty()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn case_sensitive(&self) -> bool {
        false
    }

    async fn initialize(&self, _config: &BackendConfig) -> Result<(), StorageError> {
        self.initialized.store(true, Ordering::Release);
        debug!(backend = %self.id, "Memory backend initialized");
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let (normalized, key) = self.file_key(path)?;
        self.files
            .get(&key)
            .map(|file| file.content.to_vec())
            .ok_or_else(|| StorageError::not_found(normalized))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let (normalized, key) = self.file_key(path)?;
        let file = MemoryFile { path: normalized, content: Arc::from(content), modified: Utc::now() };
        self.files.insert(key, file);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let (normalized, key) = self.file_key(path)?;
        self.files.remove(&key).map(|_| ()).ok_or_else(|| StorageError::not_found(normalized))
    }

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, StorageError> {
        let (normalized, key) = self.key(dir)?;
        let descendants = self.descendants(&key);

        if !key.is_empty() && descendants.is_empty() {
            return Err(StorageError::DirectoryNotFound { message: normalized.into(), context: None });
        }

        // Directories spelled differently by different files collapse into one entry.
        let mut entries: BTreeMap<String, String> = BTreeMap::new();
        for (segments, depth) in descendants {
            let entry = if recursive { segments.join("/") } else { segments[..=depth].join("/") };
            entries
                .entry(entry.to_lowercase())
                .and_modify(|kept| {
                    if entry < *kept {
                        kept.clone_from(&entry);
                    }
                })
                .or_insert(entry);
        }

        let mut listed: Vec<String> = entries.into_values().collect();
        listed.sort();
        Ok(listed)
    }

    async fn test_connection(&self) -> Result<bool, StorageError> {
        Ok(self.initialized.load(Ordering::Acquire))
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let (_, key) = self.key(path)?;
        Ok(self.files.contains_key(&key) || self.is_dir(&key))
    }

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError> {
        let (normalized, key) = self.key(path)?;

        if let Some(file) = self.files.get(&key) {
            return Ok(FileStat {
                path: file.path.clone(),
                size: file.content.len() as u64,
                is_dir: false,
                modified: Some(file.modified),
            });
        }

        if self.is_dir(&key) {
            return Ok(FileStat { path: normalized, size: 0, is_dir: true, modified: None });
        }

        Err(StorageError::not_found(normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new("mem");
        backend.initialize(&BackendConfig::new()).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn keys_are_case_insensitive() {
        let backend = backend().await;
        backend.write("Docs/Report.TXT", b"v1").await.unwrap();

        assert_eq!(backend.read("docs/report.txt").await.unwrap(), b"v1");

        backend.write("DOCS/REPORT.txt", b"v2").await.unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.read("docs\\report.txt").await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn listing_synthesizes_directories() {
        let backend = backend().await;
        backend.write("docs/a.txt", b"a").await.unwrap();
        backend.write("docs/sub/b.txt", b"b").await.unwrap();
        backend.write("top.txt", b"t").await.unwrap();

        assert_eq!(backend.list("", false).await.unwrap(), vec!["docs", "top.txt"]);
        assert_eq!(backend.list("docs", false).await.unwrap(), vec!["docs/a.txt", "docs/sub"]);
        assert_eq!(
            backend.list("/", true).await.unwrap(),
            vec!["docs/a.txt", "docs/sub/b.txt", "top.txt"]
        );
    }

    #[tokio::test]
    async fn listing_merges_directories_differing_in_case() {
        let backend = backend().await;
        backend.write("Docs/a.txt", b"a").await.unwrap();
        backend.write("docs/b.txt", b"b").await.unwrap();

        assert_eq!(backend.list("", false).await.unwrap(), vec!["Docs"]);
        assert_eq!(backend.list("DOCS", false).await.unwrap(), vec!["Docs/a.txt", "docs/b.txt"]);
        assert_eq!(backend.list("", true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let backend = backend().await;
        let err = backend.delete("ghost.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn escaping_the_root_is_rejected() {
        let backend = backend().await;
        let err = backend.write("../outside.txt", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::PathTraversalAttempt { .. }));
    }

    #[tokio::test]
    async fn implicit_directories_exist() {
        let backend = backend().await;
        backend.write("a/b/c.txt", b"c").await.unwrap();

        assert!(backend.exists("a/b").await.unwrap());
        assert!(backend.stat("a").await.unwrap().is_dir);
        assert!(!backend.exists("a/x").await.unwrap());
    }
}
