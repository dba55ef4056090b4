//! Records and persistence seams consumed by the gateway.
//!
//! The gateway never talks to a database itself; it depends on these traits. In-memory
//! implementations live in [`memory`] and are suitable for tests and embedding.

pub mod memory;

use crate::error::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filegate_storage::BackendConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Catalog row describing a configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRecord {
    pub id: String,
    /// Type tag understood by the backend factory.
    pub kind: String,
    pub active: bool,
    pub config: BackendConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackendRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>, config: BackendConfig) -> Self {
        let now = Utc::now();
        Self { id: id.into(), kind: kind.into(), active: true, config, created_at: now, updated_at: now }
    }
}

/// Per-user restriction set enforced by the sandbox guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxPolicy {
    pub user_id: String,
    pub read_only: bool,
    pub max_path_length: usize,
    pub allow_dotfiles: bool,
    /// Extensions without the leading dot, lowercase.
    pub blocked_extensions: BTreeSet<String>,
}

impl SandboxPolicy {
    /// Blocks `ext` (case-insensitive, leading dot optional).
    #[must_use]
    pub fn block_extension(mut self, ext: &str) -> Self {
        self.blocked_extensions.insert(normalize_extension(ext));
        self
    }

    #[must_use]
    pub fn blocks_extension(&self, ext: &str) -> bool {
        self.blocked_extensions.contains(&normalize_extension(ext))
    }
}

pub(crate) fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Level of a resource-scoped share, totally ordered.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SharePermission {
    Viewer = 1,
    Editor = 2,
    Owner = 3,
}

/// A grant of a [`SharePermission`] on one path to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileShare {
    /// Normalized `/a/b` form.
    pub resource_path: String,
    pub grantee: String,
    pub level: SharePermission,
    pub grantor: String,
    pub granted_at: DateTime<Utc>,
}

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
    strum_macros::IntoStaticStr
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum AuditStatus {
    Allowed,
    Denied,
    Failed,
}

/// Immutable record of one access decision or action failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub action: String,
    pub resource_path: String,
    pub backend_id: String,
    pub user_id: String,
    pub status: AuditStatus,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync + fmt::Debug {
    /// All rows with `active == true`.
    async fn get_active(&self) -> Result<Vec<BackendRecord>, GatewayError>;

    /// Updates the row with the same id or inserts a new one.
    async fn upsert(&self, record: BackendRecord) -> Result<(), GatewayError>;

    /// Marks the row inactive. Returns `false` if no row exists.
    async fn soft_delete(&self, id: &str) -> Result<bool, GatewayError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<BackendRecord>, GatewayError>;
}

/// Generic named permissions. Usernames and permissions compare case-insensitively.
#[async_trait]
pub trait PermissionRepository: Send + Sync + fmt::Debug {
    /// Returns `false` if the grant already existed.
    async fn add_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError>;

    /// Returns `false` if there was nothing to revoke.
    async fn remove_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError>;

    async fn has_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError>;

    async fn list_permissions(&self, user: &str) -> Result<Vec<String>, GatewayError>;

    async fn list_all(&self) -> Result<HashMap<String, Vec<String>>, GatewayError>;
}

/// Resource-scoped shares keyed by (normalized path, user).
#[async_trait]
pub trait ShareRepository: Send + Sync + fmt::Debug {
    async fn get_share(&self, path: &str, user: &str) -> Result<Option<FileShare>, GatewayError>;

    async fn upsert_share(&self, share: FileShare) -> Result<(), GatewayError>;

    async fn remove_share(&self, path: &str, user: &str) -> Result<bool, GatewayError>;

    async fn shares_for_path(&self, path: &str) -> Result<Vec<FileShare>, GatewayError>;

    async fn shares_for_user(&self, user: &str) -> Result<Vec<FileShare>, GatewayError>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync + fmt::Debug {
    async fn get_policy(&self, user: &str) -> Result<Option<SandboxPolicy>, GatewayError>;
}

/// Append-only audit store.
#[async_trait]
pub trait AuditRepository: Send + Sync + fmt::Debug {
    async fn append(&self, record: AuditRecord) -> Result<(), GatewayError>;

    async fn query_by_user(
        &self,
        user: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, GatewayError>;

    async fn query_by_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, GatewayError>;
}
