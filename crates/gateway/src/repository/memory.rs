use super::{
    AuditRecord, AuditRepository, BackendRecord, CatalogRepository, FileShare, PermissionRepository,
    PolicyRepository, SandboxPolicy, ShareRepository,
};
use crate::error::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    rows: DashMap<String, BackendRecord>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn get_active(&self) -> Result<Vec<BackendRecord>, GatewayError> {
        let mut active: Vec<BackendRecord> =
            self.rows.iter().filter(|row| row.active).map(|row| row.value().clone()).collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }

    async fn upsert(&self, record: BackendRecord) -> Result<(), GatewayError> {
        self.rows
            .entry(record.id.clone())
            .and_modify(|row| {
                row.kind.clone_from(&record.kind);
                row.config = record.config.clone();
                row.active = record.active;
                row.updated_at = Utc::now();
            })
            .or_insert(record);
        Ok(())
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError> {
        Ok(self
            .rows
            .get_mut(id)
            .map(|mut row| {
                row.active = false;
                row.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<BackendRecord>, GatewayError> {
        Ok(self.rows.get(id).map(|row| row.value().clone()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPermissions {
    grants: DashMap<String, BTreeSet<String>>,
}

impl InMemoryPermissions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionRepository for InMemoryPermissions {
    async fn add_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError> {
        Ok(self.grants.entry(user.to_lowercase()).or_default().insert(permission.to_lowercase()))
    }

    async fn remove_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError> {
        Ok(self
            .grants
            .get_mut(&user.to_lowercase())
            .is_some_and(|mut set| set.remove(&permission.to_lowercase())))
    }

    async fn has_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError> {
        Ok(self
            .grants
            .get(&user.to_lowercase())
            .is_some_and(|set| set.contains(&permission.to_lowercase())))
    }

    async fn list_permissions(&self, user: &str) -> Result<Vec<String>, GatewayError> {
        Ok(self
            .grants
            .get(&user.to_lowercase())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_all(&self) -> Result<HashMap<String, Vec<String>>, GatewayError> {
        Ok(self
            .grants
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryShares {
    shares: DashMap<(String, String), FileShare>,
}

impl InMemoryShares {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn share_key(path: &str, user: &str) -> (String, String) {
    (path.to_owned(), user.to_lowercase())
}

#[async_trait]
impl ShareRepository for InMemoryShares {
    async fn get_share(&self, path: &str, user: &str) -> Result<Option<FileShare>, GatewayError> {
        Ok(self.shares.get(&share_key(path, user)).map(|share| share.value().clone()))
    }

    async fn upsert_share(&self, share: FileShare) -> Result<(), GatewayError> {
        self.shares.insert(share_key(&share.resource_path, &share.grantee), share);
        Ok(())
    }

    async fn remove_share(&self, path: &str, user: &str) -> Result<bool, GatewayError> {
        Ok(self.shares.remove(&share_key(path, user)).is_some())
    }

    async fn shares_for_path(&self, path: &str) -> Result<Vec<FileShare>, GatewayError> {
        let mut shares: Vec<FileShare> = self
            .shares
            .iter()
            .filter(|entry| entry.key().0 == path)
            .map(|entry| entry.value().clone())
            .collect();
        shares.sort_by(|a, b| a.grantee.cmp(&b.grantee));
        Ok(shares)
    }

    async fn shares_for_user(&self, user: &str) -> Result<Vec<FileShare>, GatewayError> {
        let user = user.to_lowercase();
        let mut shares: Vec<FileShare> = self
            .shares
            .iter()
            .filter(|entry| entry.key().1 == user)
            .map(|entry| entry.value().clone())
            .collect();
        shares.sort_by(|a, b| a.resource_path.cmp(&b.resource_path));
        Ok(shares)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPolicies {
    policies: DashMap<String, SandboxPolicy>,
}

impl InMemoryPolicies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces the policy of `policy.user_id`.
    pub fn set_policy(&self, policy: SandboxPolicy) {
        self.policies.insert(policy.user_id.to_lowercase(), policy);
    }

    pub fn remove_policy(&self, user: &str) -> Option<SandboxPolicy> {
        self.policies.remove(&user.to_lowercase()).map(|(_, policy)| policy)
    }
}

#[async_trait]
impl PolicyRepository for InMemoryPolicies {
    async fn get_policy(&self, user: &str) -> Result<Option<SandboxPolicy>, GatewayError> {
        Ok(self.policies.get(&user.to_lowercase()).map(|policy| policy.value().clone()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAudit {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAudit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record in append order.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAudit {
    async fn append(&self, record: AuditRecord) -> Result<(), GatewayError> {
        self.records.write().push(record);
        Ok(())
    }

    async fn query_by_user(
        &self,
        user: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, GatewayError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.user_id.eq_ignore_ascii_case(user) && r.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn query_by_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, GatewayError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .cloned()
            .collect())
    }
}
