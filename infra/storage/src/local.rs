//! Filesystem backend jailed to a configured base path.

use crate::backend::{Backend, BackendConfig, BackendKind, FileStat};
use crate::error::{StorageError, StorageErrorExt};
use crate::maintenance;
use crate::path;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const BASE_PATH: &str = "basePath";
const CREATE: &str = "create";

/// A backend storing files under a base directory on the local disk.
///
/// Every request path is resolved against the canonical base path and rejected with
/// [`StorageError::PathTraversalAttempt`] if the result would leave it, whether through
/// `..` segments or a symlinked ancestor. Writes are atomic: data goes to a unique
/// temporary file that is synced and renamed over the target.
///
/// # Configuration
/// - `basePath` (required): root directory of the backend.
/// - `create` (optional, default `true`): create the base path if it is missing.
#[derive(Debug)]
pub struct LocalBackend {
    id: String,
    root: RwLock<Option<Arc<Path>>>,
    tmp_counter: AtomicU64,
}

impl LocalBackend {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), root: RwLock::new(None), tmp_counter: AtomicU64::new(1) }
    }

    /// The canonical base path, once initialized.
    #[must_use]
    pub fn base_path(&self) -> Option<PathBuf> {
        self.root.read().as_ref().map(|root| root.to_path_buf())
    }

    fn root(&self) -> Result<Arc<Path>, StorageError> {
        self.root.read().clone().ok_or_else(|| StorageError::not_initialized(&self.id))
    }

    fn resolve(&self, path: &str) -> Result<(Arc<Path>, PathBuf), StorageError> {
        let root = self.root()?;
        let resolved = path::resolve_jailed(&root, path)?;
        Ok((root, resolved))
    }

    fn resolve_file(&self, path: &str) -> Result<PathBuf, StorageError> {
        if path::normalize(path).is_empty() {
            return Err(StorageError::InvalidPath {
                message: path.to_owned().into(),
                context: Some("Target must be a file".into()),
            });
        }
        self.resolve(path).map(|(_, resolved)| resolved)
    }

    async fn sync_dir(path: &Path) {
        match fs::File::open(path).await {
            Ok(dir) => {
                if let Err(err) = dir.sync_all().await {
                    warn!(path = %path.display(), error = %err, "Directory sync failed");
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Directory open failed");
            },
        }
    }

    /// Writes `content` to `temp`, syncs it and renames it over `target`.
    async fn write_and_swap(temp: &Path, target: &Path, content: &[u8]) -> Result<(), StorageError> {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(temp)
            .await
            .context(format!("Temp creation failed: {}", temp.display()))?;
        file.write_all(content).await.context("Write failed")?;
        file.sync_all().await.context("Hardware sync failed")?;
        drop(file);

        match fs::rename(temp, target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                fs::remove_file(target)
                    .await
                    .context(format!("Failed to replace existing file: {}", target.display()))?;
                fs::rename(temp, target)
                    .await
                    .context(format!("Atomic swap failed: {} -> {}", temp.display(), target.display()))
            },
            Err(err) => Err(StorageError::Io {
                source: err,
                context: Some(format!("Atomic swap failed: {} -> {}", temp.display(), target.display()).into()),
            }),
        }
    }

    async fn discard_tmp(temp: &Path) {
        match fs::remove_file(temp).await {
            Ok(()) => debug!(path = %temp.display(), "Discarded temp file of failed write"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
            Err(err) => warn!(path = %temp.display(), error = %err, "Temp file cleanup failed"),
        }
    }

    fn unique_tmp_path(&self, target: &Path) -> PathBuf {
        let counter = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let file_name = target.file_name().and_then(|s| s.to_str()).unwrap_or("file");
        target.with_file_name(format!("{file_name}{}{counter}", maintenance::TMP_MARKER))
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn initialize(&self, config: &BackendConfig) -> Result<(), StorageError> {
        let base = PathBuf::from(config.require(BASE_PATH)?);
        let create = config.get(CREATE).is_none_or(|v| !v.eq_ignore_ascii_case("false"));

        if create {
            fs::create_dir_all(&base)
                .await
                .context(format!("Failed to bootstrap base path: {}", base.display()))?;
        }

        let canonical = fs::canonicalize(&base)
            .await
            .context(format!("Failed to resolve base path: {}", base.display()))?;

        maintenance::purge_tmp(&self.id, &canonical).await;

        info!(backend = %self.id, path = %canonical.display(), "Local backend initialized");
        *self.root.write() = Some(Arc::from(canonical));
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let resolved = self.resolve_file(path)?;

        match fs::read(&resolved).await {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(path::normalize(path)))
            },
            Err(err) => Err(StorageError::Io {
                source: err,
                context: Some(format!("Read failed: {}", resolved.display()).into()),
            }),
        }
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let resolved = self.resolve_file(path)?;

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create parents for {}", resolved.display()))?;
        }

        let temp = self.unique_tmp_path(&resolved);
        let swapped = Self::write_and_swap(&temp, &resolved, content).await;
        if swapped.is_err() {
            Self::discard_tmp(&temp).await;
        }
        swapped?;

        if let Some(parent) = resolved.parent() {
            Self::sync_dir(parent).await;
        }

        debug!(backend = %self.id, path = %resolved.display(), "File saved atomically");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let resolved = self.resolve_file(path)?;

        match fs::remove_file(&resolved).await {
            Ok(()) => {},
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(path::normalize(path)));
            },
            Err(err) => {
                return Err(StorageError::Io {
                    source: err,
                    context: Some(format!("Failed to delete: {}", resolved.display()).into()),
                });
            },
        }

        debug!(backend = %self.id, path = %resolved.display(), "File deleted");
        Ok(())
    }

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, StorageError> {
        let (root, resolved) = self.resolve(dir)?;

        if !fs::metadata(&resolved).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(StorageError::DirectoryNotFound {
                message: path::normalize(dir).into(),
                context: None,
            });
        }

        let mut entries = if recursive {
            tokio::task::spawn_blocking(move || walk_files(&root, &resolved))
                .await
                .map_err(|e| StorageError::Internal {
                    message: e.to_string().into(),
                    context: Some("Directory walk task panicked".into()),
                })?
        } else {
            let mut children = Vec::new();
            let mut reader = fs::read_dir(&resolved)
                .await
                .context(format!("Failed to list {}", resolved.display()))?;
            while let Some(entry) = reader.next_entry().await? {
                let name = entry.file_name();
                if name.to_str().is_some_and(maintenance::is_tmp_name) {
                    continue;
                }
                if let Some(rel) = path::relative_to(&root, &entry.path()) {
                    children.push(rel);
                }
            }
            children
        };

        entries.sort();
        Ok(entries)
    }

    async fn test_connection(&self) -> Result<bool, StorageError> {
        let root = self.root()?;
        Ok(fs::metadata(&*root).await.is_ok_and(|m| m.is_dir()))
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let (_, resolved) = self.resolve(path)?;
        fs::try_exists(&resolved).await.context("Existence check failed")
    }

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError> {
        let (_, resolved) = self.resolve(path)?;

        let meta = match fs::metadata(&resolved).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(path::normalize(path)));
            },
            Err(err) => {
                return Err(StorageError::Io {
                    source: err,
                    context: Some(format!("Failed to get metadata: {}", resolved.display()).into()),
                });
            },
        };

        Ok(FileStat {
            path: path::normalize(path),
            size: if meta.is_dir() { 0 } else { meta.len() },
            is_dir: meta.is_dir(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

fn walk_files(root: &Path, dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !entry.file_name().to_str().is_some_and(maintenance::is_tmp_name))
        .filter_map(|entry| path::relative_to(root, entry.path()))
        .collect()
}
