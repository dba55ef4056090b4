//! Bucket/key backend on top of the `object_store` crate.

use crate::backend::{Backend, BackendConfig, BackendKind, FileStat};
use crate::error::{StorageError, StorageErrorExt};
use crate::path;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ACCESS_KEY: &str = "accessKey";
const SECRET_KEY: &str = "secretKey";
const REGION: &str = "region";
const BUCKET_NAME: &str = "bucketName";
const SERVICE_URL: &str = "serviceUrl";

/// A backend addressing files as keys of a single bucket.
///
/// Directories do not exist natively; they are derived from key prefixes. Listings use
/// prefix (+ delimiter for direct children) requests, paged by the client until the
/// service reports no more results. `delete` is idempotent, matching the native
/// semantics of object stores: removing an absent key succeeds.
///
/// # Configuration
/// `accessKey`, `secretKey`, `region`, `bucketName` (required) and `serviceUrl`
/// (optional, for S3-compatible endpoints such as `MinIO`).
#[derive(Debug)]
pub struct ObjectStoreBackend {
    id: String,
    store: RwLock<Option<Arc<dyn ObjectStore>>>,
    preconfigured: bool,
}

impl ObjectStoreBackend {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), store: RwLock::new(None), preconfigured: false }
    }

    /// Creates a backend over an already-built client.
    ///
    /// `initialize` then skips building a client from configuration.
    pub fn with_store(id: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self { id: id.into(), store: RwLock::new(Some(store)), preconfigured: true }
    }

    fn store(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
        self.store.read().clone().ok_or_else(|| StorageError::not_initialized(&self.id))
    }

    fn location(path: &str) -> Result<(String, ObjectPath), StorageError> {
        let normalized = path::resolve_relative(path)?;
        if normalized.is_empty() {
            return Err(StorageError::InvalidPath {
                message: path.to_owned().into(),
                context: Some("Target must be an object key".into()),
            });
        }
        let location = ObjectPath::parse(&normalized).map_err(|e| StorageError::InvalidPath {
            message: normalized.clone().into(),
            context: Some(e.to_string().into()),
        })?;
        Ok((normalized, location))
    }

    fn prefix(dir: &str) -> Result<Option<ObjectPath>, StorageError> {
        let normalized = path::resolve_relative(dir)?;
        if normalized.is_empty() {
            return Ok(None);
        }
        ObjectPath::parse(&normalized).map(Some).map_err(|e| StorageError::InvalidPath {
            message: normalized.into(),
            context: Some(e.to_string().into()),
        })
    }

    #[cfg(feature = "s3")]
    fn build_s3(config: &BackendConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        use object_store::aws::AmazonS3Builder;

        let mut builder = AmazonS3Builder::new()
            .with_access_key_id(config.require(ACCESS_KEY)?)
            .with_secret_access_key(config.require(SECRET_KEY)?)
            .with_region(config.require(REGION)?)
            .with_bucket_name(config.require(BUCKET_NAME)?);

        if let Some(url) = config.get(SERVICE_URL) {
            builder = builder.with_endpoint(url).with_allow_http(url.starts_with("http://"));
        }

        let store = builder.build().context("Building S3 client")?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "s3"))]
    fn build_s3(config: &BackendConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        for key in [ACCESS_KEY, SECRET_KEY, REGION, BUCKET_NAME] {
            config.require(key)?;
        }
        Err(StorageError::UnsupportedType {
            message: "s3".into(),
            context: Some("Built without the `s3` feature".into()),
        })
    }
}

fn key_of(meta: &ObjectMeta) -> String {
    meta.location.to_string()
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    async fn initialize(&self, config: &BackendConfig) -> Result<(), StorageError> {
        if self.preconfigured {
            debug!(backend = %self.id, "Object-store backend uses a preconfigured client");
            return Ok(());
        }

        let store = Self::build_s3(config)?;
        *self.store.write() = Some(store);
        info!(
            backend = %self.id,
            bucket = config.get(BUCKET_NAME).unwrap_or_default(),
            "Object-store backend initialized"
        );
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let store = self.store()?;
        let (normalized, location) = Self::location(path)?;

        match store.get(&location).await {
            Ok(result) => {
                let bytes = result.bytes().await.context(format!("Reading body of {normalized}"))?;
                Ok(bytes.to_vec())
            },
            Err(object_store::Error::NotFound { .. }) => Err(StorageError::not_found(normalized)),
            Err(source) => Err(StorageError::ObjectStore {
                source,
                context: Some(format!("Get failed: {normalized}").into()),
            }),
        }
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let store = self.store()?;
        let (normalized, location) = Self::location(path)?;

        store
            .put(&location, PutPayload::from(content.to_vec()))
            .await
            .context(format!("Put failed: {normalized}"))?;

        debug!(backend = %self.id, key = %normalized, "Object stored");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let store = self.store()?;
        let (normalized, location) = Self::location(path)?;

        match store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                debug!(backend = %self.id, key = %normalized, "Object deleted");
                Ok(())
            },
            Err(source) => Err(StorageError::ObjectStore {
                source,
                context: Some(format!("Delete failed: {normalized}").into()),
            }),
        }
    }

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, StorageError> {
        let store = self.store()?;
        let prefix = Self::prefix(dir)?;

        let entries: BTreeSet<String> = if recursive {
            let objects: Vec<ObjectMeta> = store
                .list(prefix.as_ref())
                .try_collect()
                .await
                .context(format!("Listing prefix '{}'", path::normalize(dir)))?;
            objects.iter().map(key_of).collect()
        } else {
            let page = store
                .list_with_delimiter(prefix.as_ref())
                .await
                .context(format!("Listing prefix '{}'", path::normalize(dir)))?;
            page.objects
                .iter()
                .map(key_of)
                .chain(page.common_prefixes.iter().map(ToString::to_string))
                .collect()
        };

        Ok(entries.into_iter().collect())
    }

    async fn test_connection(&self) -> Result<bool, StorageError> {
        let store = self.store()?;
        match store.list_with_delimiter(None).await {
            Ok(_) => Ok(true),
            Err(err) => {
                warn!(backend = %self.id, error = %err, "Object-store connection test failed");
                Ok(false)
            },
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(StorageError::FileNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError> {
        let store = self.store()?;
        let (normalized, location) = Self::location(path)?;

        match store.head(&location).await {
            Ok(meta) => {
                return Ok(FileStat {
                    path: normalized,
                    size: meta.size,
                    is_dir: false,
                    modified: Some(meta.last_modified),
                });
            },
            Err(object_store::Error::NotFound { .. }) => {},
            Err(source) => {
                return Err(StorageError::ObjectStore {
                    source,
                    context: Some(format!("Head failed: {normalized}").into()),
                });
            },
        }

        let page = store.list_with_delimiter(Some(&location)).await?;
        if page.objects.is_empty() && page.common_prefixes.is_empty() {
            return Err(StorageError::not_found(normalized));
        }
        Ok(FileStat { path: normalized, size: 0, is_dir: true, modified: None })
    }
}
