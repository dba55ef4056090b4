//! The capability every storage backend implements.

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The closed set of backend variants, selected at runtime by a type tag.
///
/// Tags are matched case-insensitively and accept the listed aliases.
///
/// ```rust
/// use filegate_storage::BackendKind;
///
/// assert_eq!("FileSystem".parse::<BackendKind>().unwrap(), BackendKind::Local);
/// assert_eq!("aws".parse::<BackendKind>().unwrap(), BackendKind::ObjectStore);
/// assert!("tape".parse::<BackendKind>().is_err());
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum BackendKind {
    #[strum(to_string = "local", serialize = "filesystem", serialize = "disk", serialize = "file")]
    Local,
    #[strum(to_string = "memory", serialize = "inmemory", serialize = "mem")]
    Memory,
    #[serde(rename = "s3")]
    #[strum(
        to_string = "s3",
        serialize = "aws",
        serialize = "objectstore",
        serialize = "object-store",
        serialize = "minio"
    )]
    ObjectStore,
    #[strum(to_string = "ftp")]
    Ftp,
}

/// Backend-specific string settings passed to [`Backend::initialize`].
///
/// Keys are looked up case-insensitively, so `basePath` and `basepath` are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendConfig(BTreeMap<String, String>);

impl BackendConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).or_else(|| {
            self.0.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v)
        })
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
    }

    /// Returns the value of a required key.
    ///
    /// # Errors
    /// Returns [`StorageError::MissingConfig`] if the key is absent or blank.
    pub fn require(&self, key: &'static str) -> Result<&str, StorageError> {
        self.get(key).ok_or(StorageError::MissingConfig { message: key.into(), context: None })
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BackendConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for BackendConfig {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Metadata describing a single entry of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    /// Normalized, root-relative path.
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// A live handle to one storage system.
///
/// Paths are root-relative; both separator styles are accepted and leading or
/// trailing separators are ignored. Implementations must be `initialize`d before
/// any I/O call, otherwise they fail with [`StorageError::NotInitialized`].
///
/// `delete` semantics follow each storage system: local and memory backends fail with
/// [`StorageError::FileNotFound`] for a missing path while the object-store backend
/// treats it as success.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Immutable identifier assigned at construction.
    fn id(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Whether two paths differing only by case address different entries.
    fn case_sensitive(&self) -> bool {
        true
    }

    async fn initialize(&self, config: &BackendConfig) -> Result<(), StorageError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Writes the whole file, creating parent structure as needed.
    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError>;

    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Lists direct children of `dir`, or every descendant file when `recursive` is set.
    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, StorageError>;

    /// Reports whether the storage system is reachable.
    async fn test_connection(&self) -> Result<bool, StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError>;
}
