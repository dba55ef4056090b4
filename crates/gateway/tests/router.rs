pub mod fixtures;

use async_trait::async_trait;
use filegate_gateway::prelude::*;
use filegate_storage::{BackendKind, FileStat, StorageError};
use fixtures::*;
use serde_json::json;
use std::sync::Arc;

/// Backend that is never reachable and fails every call with a fixed error.
#[derive(Debug)]
struct BrokenBackend {
    unexpected: bool,
}

impl BrokenBackend {
    fn error(&self) -> StorageError {
        if self.unexpected {
            StorageError::Internal { message: "corrupted state".into(), context: None }
        } else {
            StorageError::Connection { message: "connection refused".into(), context: None }
        }
    }
}

#[async_trait]
impl Backend for BrokenBackend {
    fn id(&self) -> &str {
        if self.unexpected { "corrupt" } else { "offline" }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Ftp
    }

    async fn initialize(&self, _config: &BackendConfig) -> Result<(), StorageError> {
        Ok(())
    }

    async fn read(&self, _path: &str) -> Result<Vec<u8>, StorageError> {
        Err(self.error())
    }

    async fn write(&self, _path: &str, _content: &[u8]) -> Result<(), StorageError> {
        Err(self.error())
    }

    async fn delete(&self, _path: &str) -> Result<(), StorageError> {
        Err(self.error())
    }

    async fn list(&self, _dir: &str, _recursive: bool) -> Result<Vec<String>, StorageError> {
        Err(self.error())
    }

    async fn test_connection(&self) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn exists(&self, _path: &str) -> Result<bool, StorageError> {
        Err(self.error())
    }

    async fn stat(&self, _path: &str) -> Result<FileStat, StorageError> {
        Err(self.error())
    }
}

#[tokio::test]
async fn test_round_trip_through_aliases() {
    let h = setup_gateway().await;
    let router = h.gateway.router();

    let written = router
        .execute("scratch", "PUT", &params(json!({ "path": "docs\\a.txt", "content": "hello" })))
        .await
        .unwrap();
    assert!(written.success, "{}", written.message);
    assert_eq!(written.operation, "write");

    let read = router.execute("scratch", "readFile", &params(json!({ "path": "docs/a.txt" }))).await.unwrap();
    let payload = read.payload.unwrap();
    assert_eq!(payload["content"], "hello");
    assert_eq!(payload["encoding"], "utf8");

    let listed = router
        .execute("scratch", "ls", &params(json!({ "directory": "docs", "recursive": true })))
        .await
        .unwrap();
    assert_eq!(listed.payload.unwrap()["entries"], json!(["docs/a.txt"]));

    let exists = router.execute("scratch", "fileexists", &params(json!({ "path": "docs/a.txt" }))).await.unwrap();
    assert_eq!(exists.payload.unwrap()["exists"], true);

    let stat = router.execute("scratch", "info", &params(json!({ "path": "docs/a.txt" }))).await.unwrap();
    let stat = stat.payload.unwrap();
    assert_eq!(stat["size"], 5);
    assert_eq!(stat["isDir"], false);

    let deleted = router.execute("scratch", "rm", &params(json!({ "path": "docs/a.txt" }))).await.unwrap();
    assert!(deleted.success);

    let ping = router.execute("scratch", "ping", &params(json!({}))).await.unwrap();
    assert_eq!(ping.payload.unwrap()["reachable"], true);
}

#[tokio::test]
async fn test_binary_content_uses_base64() {
    let h = setup_gateway().await;
    let router = h.gateway.router();

    let written = router
        .execute(
            "scratch",
            "write",
            &params(json!({ "path": "blob.bin", "content": "/wD+", "encoding": "base64" })),
        )
        .await
        .unwrap();
    assert!(written.success);

    let read = router.execute("scratch", "read", &params(json!({ "path": "blob.bin" }))).await.unwrap();
    let payload = read.payload.unwrap();
    assert_eq!(payload["encoding"], "base64");
    assert_eq!(payload["content"], "/wD+");

    let bad = router
        .execute(
            "scratch",
            "write",
            &params(json!({ "path": "blob.bin", "content": "***", "encoding": "base64" })),
        )
        .await
        .unwrap();
    assert_eq!(bad.error, Some(ErrorKind::InvalidArgument));
}

#[tokio::test]
async fn test_domain_errors_become_failed_results() {
    let h = setup_gateway().await;
    let router = h.gateway.router();

    let unknown_op = router.execute("scratch", "format", &params(json!({}))).await.unwrap();
    assert!(!unknown_op.success);
    assert_eq!(unknown_op.operation, "format");
    assert_eq!(unknown_op.error, Some(ErrorKind::InvalidArgument));

    let unknown_backend = router.execute("nowhere", "read", &params(json!({ "path": "a" }))).await.unwrap();
    assert_eq!(unknown_backend.error, Some(ErrorKind::NotFound));

    let missing_param = router.execute("scratch", "write", &params(json!({ "path": "a" }))).await.unwrap();
    assert_eq!(missing_param.error, Some(ErrorKind::InvalidArgument));

    let wrong_type = router.execute("scratch", "list", &params(json!({ "recursive": 3 }))).await.unwrap();
    assert_eq!(wrong_type.error, Some(ErrorKind::InvalidArgument));

    let missing_file = router.execute("scratch", "read", &params(json!({ "path": "a" }))).await.unwrap();
    assert_eq!(missing_file.error, Some(ErrorKind::NotFound));
    assert!(missing_file.payload.is_none());
}

#[tokio::test]
async fn test_unavailable_and_unexpected_backends() {
    let h = setup_gateway().await;
    let router = h.gateway.router();
    h.registry.register(Arc::new(BrokenBackend { unexpected: false }), BackendConfig::new()).await.unwrap();
    h.registry.register(Arc::new(BrokenBackend { unexpected: true }), BackendConfig::new()).await.unwrap();

    let ping = router.execute("offline", "test", &params(json!({}))).await.unwrap();
    assert!(!ping.success);
    assert_eq!(ping.error, Some(ErrorKind::Unavailable));

    let read = router.execute("offline", "read", &params(json!({ "path": "a" }))).await.unwrap();
    assert_eq!(read.error, Some(ErrorKind::Unavailable));

    let err = router.execute("corrupt", "read", &params(json!({ "path": "a" }))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unexpected);
}

#[tokio::test]
async fn test_gateway_execute_checks_access_first() {
    let h = setup_gateway().await;
    h.acl.grant("writer", "write").await.unwrap();

    let written = h
        .gateway
        .execute("writer", "scratch", "upload", &params(json!({ "path": "in/x.txt", "content": "x" })))
        .await
        .unwrap();
    assert!(written.success);

    let err = h
        .gateway
        .execute("writer", "scratch", "get", &params(json!({ "path": "in/x.txt" })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let statuses: Vec<AuditStatus> = h.audit.records().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![AuditStatus::Allowed, AuditStatus::Denied]);
}
