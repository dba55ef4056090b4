//! Read-through caching decorator usable over any [`Backend`].

use crate::backend::{Backend, BackendConfig, BackendKind, FileStat};
use crate::builder::CachingBackendBuilder;
use crate::error::StorageError;
use crate::path;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Time-to-live and capacity settings of a [`CachingBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    #[serde(with = "secs")]
    pub content_ttl: Duration,
    #[serde(with = "secs")]
    pub listing_ttl: Duration,
    #[serde(with = "secs")]
    pub connection_ttl: Duration,
    pub max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            content_ttl: Duration::from_secs(300),
            listing_ttl: Duration::from_secs(60),
            connection_ttl: Duration::from_secs(30),
            max_capacity: 10_000,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CachedOp {
    Content,
    Listing,
    Connection,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    backend: Arc<str>,
    op: CachedOp,
    path: String,
    recursive: bool,
}

/// A [`Backend`] that caches another backend's reads.
///
/// - `read` is cache-aside with the content TTL; a successful `write` or `delete` of the
///   same path drops the entry before returning. A read that overlapped such a write or
///   delete returns what it read but does not populate the cache.
/// - `list` results are cached per `(dir, recursive)` with the listing TTL and are *not*
///   invalidated by writes; use [`CachingBackend::invalidate_listing`] when freshness
///   matters.
/// - `test_connection` is cached with the connection TTL and reset by `initialize`.
/// - `exists` and `stat` always delegate.
///
/// Entries expire at an absolute time after insertion; reads do not extend their life.
#[derive(Debug)]
pub struct CachingBackend {
    inner: Arc<dyn Backend>,
    id: Arc<str>,
    content: moka::sync::Cache<CacheKey, Arc<[u8]>>,
    /// Ticket of the latest in-flight content fill per key; cleared by `write` and `delete`.
    fills: DashMap<CacheKey, u64>,
    next_fill: AtomicU64,
    listings: Cache<CacheKey, Arc<Vec<String>>>,
    connection: Cache<CacheKey, bool>,
}

impl CachingBackend {
    #[must_use]
    pub fn builder() -> CachingBackendBuilder {
        CachingBackendBuilder::new()
    }

    pub(crate) fn new(inner: Arc<dyn Backend>, settings: &CacheSettings) -> Self {
        let id: Arc<str> = Arc::from(inner.id());
        Self {
            content: moka::sync::Cache::builder()
                .max_capacity(settings.max_capacity)
                .time_to_live(settings.content_ttl)
                .build(),
            fills: DashMap::new(),
            next_fill: AtomicU64::new(0),
            listings: build_cache(settings.listing_ttl, settings.max_capacity),
            connection: build_cache(settings.connection_ttl, settings.max_capacity),
            inner,
            id,
        }
    }

    /// The wrapped backend.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Backend> {
        &self.inner
    }

    fn key(&self, op: CachedOp, path: &str, recursive: bool) -> CacheKey {
        let normalized = path::normalize(path);
        let path = if self.inner.case_sensitive() { normalized } else { normalized.to_lowercase() };
        CacheKey { backend: Arc::clone(&self.id), op, path, recursive }
    }

    fn forget_content(&self, path: &str) {
        let key = self.key(CachedOp::Content, path, false);
        self.fills.remove(&key);
        self.content.invalidate(&key);
    }

    /// Drops both cached listings of `dir`.
    pub async fn invalidate_listing(&self, dir: &str) {
        for recursive in [false, true] {
            self.listings.invalidate(&self.key(CachedOp::Listing, dir, recursive)).await;
        }
    }

    /// Drops every cached entry of this decorator.
    pub fn invalidate_all(&self) {
        self.fills.clear();
        self.content.invalidate_all();
        self.listings.invalidate_all();
        self.connection.invalidate_all();
        debug!(backend = %self.id, "Cache cleared");
    }
}

fn build_cache<V: Clone + Send + Sync + 'static>(ttl: Duration, capacity: u64) -> Cache<CacheKey, V> {
    Cache::builder().max_capacity(capacity).time_to_live(ttl).build()
}

#[async_trait]
impl Backend for CachingBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn case_sensitive(&self) -> bool {
        self.inner.case_sensitive()
    }

    async fn initialize(&self, config: &BackendConfig) -> Result<(), StorageError> {
        self.inner.initialize(config).await?;
        self.connection.invalidate(&self.key(CachedOp::Connection, "", false)).await;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key(CachedOp::Content, path, false);
        if let Some(hit) = self.content.get(&key) {
            trace!(backend = %self.id, path = %key.path, "Content cache hit");
            return Ok(hit.to_vec());
        }

        let ticket = self.next_fill.fetch_add(1, Ordering::Relaxed);
        self.fills.insert(key.clone(), ticket);
        let data = match self.inner.read(path).await {
            Ok(data) => data,
            Err(e) => {
                self.fills.remove_if(&key, |_, current| *current == ticket);
                return Err(e);
            },
        };

        // The ticket is gone if a write or delete finished during the read.
        if let Entry::Occupied(fill) = self.fills.entry(key.clone())
            && *fill.get() == ticket
        {
            self.content.insert(key, Arc::from(data.as_slice()));
            fill.remove();
        } else {
            trace!(backend = %self.id, path = %key.path, "Skipping fill overlapped by a mutation");
        }
        Ok(data)
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        self.inner.write(path, content).await?;
        self.forget_content(path);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.inner.delete(path).await?;
        self.forget_content(path);
        Ok(())
    }

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, StorageError> {
        let key = self.key(CachedOp::Listing, dir, recursive);
        if let Some(hit) = self.listings.get(&key).await {
            trace!(backend = %self.id, dir = %key.path, recursive, "Listing cache hit");
            return Ok(hit.as_ref().clone());
        }

        let entries = self.inner.list(dir, recursive).await?;
        self.listings.insert(key, Arc::new(entries.clone())).await;
        Ok(entries)
    }

    async fn test_connection(&self) -> Result<bool, StorageError> {
        let key = self.key(CachedOp::Connection, "", false);
        if let Some(hit) = self.connection.get(&key).await {
            return Ok(hit);
        }

        let reachable = self.inner.test_connection().await?;
        self.connection.insert(key, reachable).await;
        Ok(reachable)
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.inner.exists(path).await
    }

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError> {
        self.inner.stat(path).await
    }
}
