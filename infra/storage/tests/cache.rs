use async_trait::async_trait;
use filegate_storage::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Counts calls reaching the wrapped backend. Can be told to fail writes and to hold read
/// results back for a while after taking them.
#[derive(Debug)]
struct CountingBackend {
    inner: MemoryBackend,
    reads: AtomicUsize,
    lists: AtomicUsize,
    pings: AtomicUsize,
    fail_writes: AtomicBool,
    read_delay_ms: AtomicU64,
}

impl CountingBackend {
    async fn new() -> Arc<Self> {
        let inner = MemoryBackend::new("counted");
        inner.initialize(&BackendConfig::new()).await.unwrap();
        Arc::new(Self {
            inner,
            reads: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            read_delay_ms: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Backend for CountingBackend {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn case_sensitive(&self) -> bool {
        self.inner.case_sensitive()
    }

    async fn initialize(&self, config: &BackendConfig) -> Result<(), StorageError> {
        self.inner.initialize(config).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let data = self.inner.read(path).await;
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        data
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection { message: "link down".into(), context: None });
        }
        self.inner.write(path, content).await
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.inner.delete(path).await
    }

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, StorageError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(dir, recursive).await
    }

    async fn test_connection(&self) -> Result<bool, StorageError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.inner.test_connection().await
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.inner.exists(path).await
    }

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError> {
        self.inner.stat(path).await
    }
}

#[tokio::test]
async fn test_repeated_reads_hit_the_cache() {
    let counting = CountingBackend::new().await;
    let cached = CachingBackend::builder().inner(counting.clone()).build();

    cached.write("a.txt", b"hello").await.unwrap();
    for _ in 0..5 {
        assert_eq!(cached.read("a.txt").await.unwrap(), b"hello");
    }
    assert_eq!(counting.reads.load(Ordering::SeqCst), 1);

    assert_eq!(cached.read("A.TXT").await.unwrap(), b"hello");
    assert_eq!(counting.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_write_then_read_returns_new_content() {
    let counting = CountingBackend::new().await;
    let cached = CachingBackend::builder().inner(counting.clone()).build();

    cached.write("doc.txt", b"v1").await.unwrap();
    assert_eq!(cached.read("doc.txt").await.unwrap(), b"v1");

    cached.write("doc.txt", b"v2").await.unwrap();
    assert_eq!(cached.read("doc.txt").await.unwrap(), b"v2");

    cached.delete("doc.txt").await.unwrap();
    assert_eq!(cached.read("doc.txt").await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_write_during_slow_read_is_not_masked() {
    let counting = CountingBackend::new().await;
    let cached = Arc::new(CachingBackend::builder().inner(counting.clone()).build());
    cached.write("a.txt", b"v1").await.unwrap();
    counting.read_delay_ms.store(100, Ordering::SeqCst);

    let slow = tokio::spawn({
        let cached = Arc::clone(&cached);
        async move { cached.read("a.txt").await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cached.write("a.txt", b"v2").await.unwrap();

    assert_eq!(slow.await.unwrap().unwrap(), b"v1");
    counting.read_delay_ms.store(0, Ordering::SeqCst);
    assert_eq!(cached.read("a.txt").await.unwrap(), b"v2");
    assert_eq!(cached.read("a.txt").await.unwrap(), b"v2");
    assert_eq!(counting.reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_delete_during_slow_read_is_not_masked() {
    let counting = CountingBackend::new().await;
    let cached = Arc::new(CachingBackend::builder().inner(counting.clone()).build());
    cached.write("gone.txt", b"old").await.unwrap();
    counting.read_delay_ms.store(100, Ordering::SeqCst);

    let slow = tokio::spawn({
        let cached = Arc::clone(&cached);
        async move { cached.read("gone.txt").await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cached.delete("gone.txt").await.unwrap();

    assert_eq!(slow.await.unwrap().unwrap(), b"old");
    counting.read_delay_ms.store(0, Ordering::SeqCst);
    assert_eq!(cached.read("gone.txt").await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_failed_write_keeps_cached_content() {
    let counting = CountingBackend::new().await;
    let cached = CachingBackend::builder().inner(counting.clone()).build();

    cached.write("doc.txt", b"v1").await.unwrap();
    assert_eq!(cached.read("doc.txt").await.unwrap(), b"v1");

    counting.fail_writes.store(true, Ordering::SeqCst);
    let err = cached.write("doc.txt", b"v2").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    assert_eq!(cached.read("doc.txt").await.unwrap(), b"v1");
    assert_eq!(counting.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_listings_are_cached_per_recursion_flag() {
    let counting = CountingBackend::new().await;
    let cached = CachingBackend::builder().inner(counting.clone()).build();
    cached.write("d/x/a.txt", b"a").await.unwrap();

    cached.list("d", false).await.unwrap();
    cached.list("d", false).await.unwrap();
    assert_eq!(counting.lists.load(Ordering::SeqCst), 1);

    cached.list("d", true).await.unwrap();
    assert_eq!(counting.lists.load(Ordering::SeqCst), 2);

    cached.invalidate_all();
    cached.list("d", true).await.unwrap();
    assert_eq!(counting.lists.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_connection_status_is_cached_until_reinitialized() {
    let counting = CountingBackend::new().await;
    let cached = CachingBackend::builder()
        .connection_ttl(Duration::from_secs(60))
        .inner(counting.clone())
        .build();

    assert!(cached.test_connection().await.unwrap());
    assert!(cached.test_connection().await.unwrap());
    assert_eq!(counting.pings.load(Ordering::SeqCst), 1);

    cached.initialize(&BackendConfig::new()).await.unwrap();
    assert!(cached.test_connection().await.unwrap());
    assert_eq!(counting.pings.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_decorator_reports_inner_identity() {
    let counting = CountingBackend::new().await;
    let cached = CachingBackend::builder().inner(counting).build();

    assert_eq!(cached.id(), "counted");
    assert_eq!(cached.kind(), BackendKind::Memory);
    assert!(!cached.case_sensitive());
}
