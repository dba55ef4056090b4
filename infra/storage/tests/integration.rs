use filegate_storage::*;
use object_store::memory::InMemory;
use std::sync::Arc;
use tempfile::TempDir;

fn local_config(temp: &TempDir) -> BackendConfig {
    BackendConfig::from([("basePath", temp.path().join("root").display().to_string())])
}

async fn all_backends(temp: &TempDir) -> Vec<Arc<dyn Backend>> {
    let factory = BackendFactory::new();
    let local = factory.create("local", "local", &local_config(temp)).await.unwrap();
    let memory = factory.create("memory", "memory", &BackendConfig::new()).await.unwrap();

    let object: Arc<dyn Backend> =
        Arc::new(ObjectStoreBackend::with_store("bucket", Arc::new(InMemory::new())));
    object.initialize(&BackendConfig::new()).await.unwrap();

    vec![local, memory, object]
}

#[tokio::test]
async fn test_factory_roundtrip_for_every_backend() {
    let temp = TempDir::new().unwrap();

    for backend in all_backends(&temp).await {
        backend.write("docs/report.txt", b"quarterly").await.unwrap();
        assert_eq!(backend.read("docs/report.txt").await.unwrap(), b"quarterly", "{}", backend.id());

        backend.write("docs/empty.txt", b"").await.unwrap();
        assert!(backend.read("docs/empty.txt").await.unwrap().is_empty(), "{}", backend.id());
        assert!(backend.exists("docs/empty.txt").await.unwrap());
        assert_eq!(backend.stat("docs/empty.txt").await.unwrap().size, 0);

        let listed = backend.list("docs", false).await.unwrap();
        assert_eq!(listed, vec!["docs/empty.txt", "docs/report.txt"], "{}", backend.id());
    }
}

#[tokio::test]
async fn test_overwrite_replaces_content() {
    let temp = TempDir::new().unwrap();

    for backend in all_backends(&temp).await {
        backend.write("a.bin", &[1, 2, 3]).await.unwrap();
        backend.write("a.bin", &[9]).await.unwrap();
        assert_eq!(backend.read("a.bin").await.unwrap(), vec![9], "{}", backend.id());
    }
}

#[tokio::test]
async fn test_local_escape_is_rejected_and_nothing_is_created() {
    let temp = TempDir::new().unwrap();
    let backend = BackendFactory::new().create("disk", "jail", &local_config(&temp)).await.unwrap();

    let err = backend.write("../../escape.txt", b"pwned").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = backend.read("sub/../../escape.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    assert!(!temp.path().join("escape.txt").exists());
    assert!(!temp.path().join("root").join("escape.txt").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_symlinked_ancestor_cannot_leave_jail() {
    let temp = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let backend = BackendFactory::new().create("local", "jail", &local_config(&temp)).await.unwrap();

    std::os::unix::fs::symlink(outside.path(), temp.path().join("root").join("link")).unwrap();

    let err = backend.write("link/evil.txt", b"x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(!outside.path().join("evil.txt").exists());
}

#[tokio::test]
async fn test_delete_of_missing_path_depends_on_backend() {
    let temp = TempDir::new().unwrap();
    let backends = all_backends(&temp).await;

    for backend in &backends {
        let result = backend.delete("never/written.txt").await;
        match backend.kind() {
            BackendKind::ObjectStore => assert!(result.is_ok()),
            _ => assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound, "{}", backend.id()),
        }
    }
}

#[tokio::test]
async fn test_recursive_listing_returns_files_only() {
    let temp = TempDir::new().unwrap();

    for backend in all_backends(&temp).await {
        backend.write("tree/a.txt", b"a").await.unwrap();
        backend.write("tree/x/b.txt", b"b").await.unwrap();
        backend.write("tree/x/y/c.txt", b"c").await.unwrap();

        let all = backend.list("tree", true).await.unwrap();
        assert_eq!(all, vec!["tree/a.txt", "tree/x/b.txt", "tree/x/y/c.txt"], "{}", backend.id());

        let direct = backend.list("/tree/", false).await.unwrap();
        assert_eq!(direct, vec!["tree/a.txt", "tree/x"], "{}", backend.id());
    }
}

#[tokio::test]
async fn test_missing_file_is_not_found_everywhere() {
    let temp = TempDir::new().unwrap();

    for backend in all_backends(&temp).await {
        let err = backend.read("ghost.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "{}", backend.id());
        assert!(!backend.exists("ghost.txt").await.unwrap());
    }
}

#[tokio::test]
async fn test_uninitialized_backend_is_unexpected() {
    let backend = MemoryBackend::new("cold");
    let err = backend.read("a.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unexpected);
}

#[tokio::test]
async fn test_connection_checks() {
    let temp = TempDir::new().unwrap();

    for backend in all_backends(&temp).await {
        assert!(backend.test_connection().await.unwrap(), "{}", backend.id());
    }
}
