#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filegate_gateway::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Fully wired gateway over in-memory repositories with a `scratch` memory backend.
#[derive(Debug)]
pub struct Harness {
    pub registry: Arc<BackendRegistry>,
    pub catalog: Arc<InMemoryCatalog>,
    pub acl: Arc<AccessControl>,
    pub policies: Arc<InMemoryPolicies>,
    pub audit: Arc<InMemoryAudit>,
    pub gateway: FileGateway,
}

/// Builds a [`Harness`].
/// # Panics
/// * If the `scratch` backend cannot be registered.
pub async fn setup_gateway() -> Harness {
    let catalog = Arc::new(InMemoryCatalog::new());
    let registry = Arc::new(BackendRegistry::new(catalog.clone()));
    assert!(registry.create_and_register("memory", "scratch", BackendConfig::new()).await.unwrap());

    let acl = Arc::new(AccessControl::new(
        Arc::new(InMemoryPermissions::new()),
        Arc::new(InMemoryShares::new()),
    ));
    let policies = Arc::new(InMemoryPolicies::new());
    let sandbox = Arc::new(SandboxGuard::new(policies.clone(), SandboxDefaults::default(), acl.clone()));
    let audit = Arc::new(InMemoryAudit::new());
    let proxy = SecurityProxy::new(sandbox, audit.clone());
    let gateway = FileGateway::new(proxy, Router::new(registry.clone()));

    Harness { registry, catalog, acl, policies, audit, gateway }
}

/// Builds a JSON parameter map from a `serde_json::json!` object.
/// # Panics
/// * If `value` is not an object.
pub fn params(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// Audit store whose appends always fail.
#[derive(Debug, Default)]
pub struct FailingAudit;

#[async_trait]
impl AuditRepository for FailingAudit {
    async fn append(&self, _record: AuditRecord) -> Result<(), GatewayError> {
        Err(GatewayError::Repository { message: "audit store offline".into(), context: None })
    }

    async fn query_by_user(
        &self,
        _user: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, GatewayError> {
        Ok(Vec::new())
    }

    async fn query_by_range(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, GatewayError> {
        Ok(Vec::new())
    }
}

/// Catalog whose upserts take `delay` before reaching the wrapped in-memory catalog, and
/// fail while `fail_upserts` is set.
#[derive(Debug)]
pub struct SlowCatalog {
    pub inner: InMemoryCatalog,
    pub delay: Duration,
    pub fail_upserts: AtomicBool,
}

impl SlowCatalog {
    pub fn new(delay: Duration) -> Self {
        Self { inner: InMemoryCatalog::new(), delay, fail_upserts: AtomicBool::new(false) }
    }
}

#[async_trait]
impl CatalogRepository for SlowCatalog {
    async fn get_active(&self) -> Result<Vec<BackendRecord>, GatewayError> {
        self.inner.get_active().await
    }

    async fn upsert(&self, record: BackendRecord) -> Result<(), GatewayError> {
        tokio::time::sleep(self.delay).await;
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(GatewayError::Repository { message: "catalog offline".into(), context: None });
        }
        self.inner.upsert(record).await
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError> {
        self.inner.soft_delete(id).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<BackendRecord>, GatewayError> {
        self.inner.get_by_id(id).await
    }
}

/// Permission store that takes its snapshot immediately but answers only after `delay`.
#[derive(Debug)]
pub struct SlowPermissions {
    pub inner: InMemoryPermissions,
    pub delay: Duration,
}

impl SlowPermissions {
    pub fn new(delay: Duration) -> Self {
        Self { inner: InMemoryPermissions::new(), delay }
    }
}

#[async_trait]
impl PermissionRepository for SlowPermissions {
    async fn add_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError> {
        self.inner.add_permission(user, permission).await
    }

    async fn remove_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError> {
        self.inner.remove_permission(user, permission).await
    }

    async fn has_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError> {
        self.inner.has_permission(user, permission).await
    }

    async fn list_permissions(&self, user: &str) -> Result<Vec<String>, GatewayError> {
        let snapshot = self.inner.list_permissions(user).await;
        tokio::time::sleep(self.delay).await;
        snapshot
    }

    async fn list_all(&self) -> Result<HashMap<String, Vec<String>>, GatewayError> {
        self.inner.list_all().await
    }
}
