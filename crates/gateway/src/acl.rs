//! Access control: generic named permissions plus resource-scoped file shares.

use crate::error::GatewayError;
use crate::repository::{FileShare, PermissionRepository, SharePermission, ShareRepository};
use crate::sandbox::normalize_resource;
use chrono::Utc;
use moka::future::Cache;
use std::collections::BTreeSet;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Generic permission that satisfies every operation.
pub const ADMIN_PERMISSION: &str = "admin";

/// Operation names understood by the access checks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Access {
    Read,
    List,
    Write,
    Create,
    Move,
    Copy,
    Delete,
    Share,
}

impl Access {
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Read | Self::List)
    }

    /// Minimum share level that grants this operation.
    #[must_use]
    pub const fn required_level(self) -> SharePermission {
        match self {
            Self::Read | Self::List => SharePermission::Viewer,
            Self::Write | Self::Create | Self::Move | Self::Copy => SharePermission::Editor,
            Self::Delete | Self::Share => SharePermission::Owner,
        }
    }

    /// Generic permission checked when the user holds no share on the resource.
    #[must_use]
    pub const fn fallback_permission(self) -> &'static str {
        match self {
            Self::Read | Self::List => "read",
            Self::Write | Self::Create | Self::Move | Self::Copy => "write",
            Self::Delete => "delete",
            Self::Share => ADMIN_PERMISSION,
        }
    }
}

type ShareKey = (String, String);

const CACHE_CAPACITY: u64 = 10_000;
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Cached value tagged with the mutation generation observed before it was loaded.
#[derive(Debug, Clone)]
struct Stamped<T> {
    generation: u64,
    value: T,
}

/// Read-through view over the permission and share repositories.
///
/// Permissions are cached per lowercase user and shares per (normalized path, lowercase
/// user), including known absences. Both caches are bounded and expire entries after a
/// time-to-live, so changes made directly in the repositories become visible eventually.
///
/// Every mutation bumps a generation counter after its repository write. An entry loaded
/// under an older generation is reloaded instead of served, so a revoke racing an in-flight
/// load can never leave the revoked grant cached.
#[derive(Debug)]
pub struct AccessControl {
    permissions: Arc<dyn PermissionRepository>,
    shares: Arc<dyn ShareRepository>,
    generation: AtomicU64,
    permission_cache: Cache<String, Stamped<Arc<BTreeSet<String>>>>,
    share_cache: Cache<ShareKey, Stamped<Option<FileShare>>>,
}

impl AccessControl {
    #[must_use]
    pub fn new(permissions: Arc<dyn PermissionRepository>, shares: Arc<dyn ShareRepository>) -> Self {
        Self {
            permissions,
            shares,
            generation: AtomicU64::new(0),
            permission_cache: build_cache(CACHE_CAPACITY, CACHE_TTL),
            share_cache: build_cache(CACHE_CAPACITY, CACHE_TTL),
        }
    }

    /// Replaces the default bound (10 000 entries per cache) and time-to-live (5 minutes).
    #[must_use]
    pub fn with_cache_policy(mut self, max_capacity: u64, ttl: Duration) -> Self {
        self.permission_cache = build_cache(max_capacity, ttl);
        self.share_cache = build_cache(max_capacity, ttl);
        self
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn grant(&self, user: &str, permission: &str) -> Result<bool, GatewayError> {
        require("user", user)?;
        require("permission", permission)?;
        let added = self.permissions.add_permission(user, permission).await?;
        self.bump_generation();
        self.permission_cache.invalidate(&user.to_lowercase()).await;
        if added {
            info!(user, permission, "Permission granted");
        }
        Ok(added)
    }

    pub async fn revoke(&self, user: &str, permission: &str) -> Result<bool, GatewayError> {
        let removed = self.permissions.remove_permission(user, permission).await?;
        self.bump_generation();
        self.permission_cache.invalidate(&user.to_lowercase()).await;
        if removed {
            info!(user, permission, "Permission revoked");
        }
        Ok(removed)
    }

    pub async fn has_permission(&self, user: &str, permission: &str) -> Result<bool, GatewayError> {
        Ok(self.load_permissions(user).await?.contains(&permission.to_lowercase()))
    }

    pub async fn permissions(&self, user: &str) -> Result<Vec<String>, GatewayError> {
        Ok(self.load_permissions(user).await?.iter().cloned().collect())
    }

    /// Drops both caches and preloads permissions from the repository's current contents.
    pub async fn refresh(&self) -> Result<(), GatewayError> {
        self.bump_generation();
        self.permission_cache.invalidate_all();
        self.share_cache.invalidate_all();

        let generation = self.generation();
        let all = self.permissions.list_all().await?;
        let users = all.len();
        for (user, grants) in all {
            let value = Arc::new(grants.iter().map(|p| p.to_lowercase()).collect());
            self.permission_cache.insert(user.to_lowercase(), Stamped { generation, value }).await;
        }
        debug!(users, "Access control caches refreshed");
        Ok(())
    }

    async fn load_permissions(&self, user: &str) -> Result<Arc<BTreeSet<String>>, GatewayError> {
        let key = user.to_lowercase();
        let cached = self
            .permission_cache
            .try_get_with(key.clone(), self.fetch_permissions(&key))
            .await
            .map_err(unshare)?;
        if cached.generation == self.generation() {
            return Ok(cached.value);
        }

        trace!(user = %key, "Reloading permissions loaded before a mutation");
        let fresh = self.fetch_permissions(&key).await?;
        let value = Arc::clone(&fresh.value);
        self.permission_cache.insert(key, fresh).await;
        Ok(value)
    }

    async fn fetch_permissions(&self, user: &str) -> Result<Stamped<Arc<BTreeSet<String>>>, GatewayError> {
        let generation = self.generation();
        let grants = self.permissions.list_permissions(user).await?;
        let value = Arc::new(grants.iter().map(|p| p.to_lowercase()).collect());
        Ok(Stamped { generation, value })
    }

    /// Grants `level` on `path` to `user`, replacing any existing share of that pair.
    pub async fn share_file(
        &self,
        path: &str,
        user: &str,
        level: SharePermission,
        grantor: &str,
    ) -> Result<FileShare, GatewayError> {
        require("path", path)?;
        require("user", user)?;
        let share = FileShare {
            resource_path: normalize_resource(path),
            grantee: user.to_lowercase(),
            level,
            grantor: grantor.to_owned(),
            granted_at: Utc::now(),
        };
        self.shares.upsert_share(share.clone()).await?;
        self.bump_generation();
        self.share_cache.invalidate(&(share.resource_path.clone(), share.grantee.clone())).await;
        info!(path = %share.resource_path, user = %share.grantee, %level, grantor, "File shared");
        Ok(share)
    }

    pub async fn revoke_share(&self, path: &str, user: &str) -> Result<bool, GatewayError> {
        let key = share_key(path, user);
        let removed = self.shares.remove_share(&key.0, &key.1).await?;
        self.bump_generation();
        if removed {
            info!(path = %key.0, user = %key.1, "File share revoked");
        }
        self.share_cache.invalidate(&key).await;
        Ok(removed)
    }

    pub async fn get_share(&self, path: &str, user: &str) -> Result<Option<FileShare>, GatewayError> {
        let key = share_key(path, user);
        let cached = self
            .share_cache
            .try_get_with(key.clone(), self.fetch_share(&key))
            .await
            .map_err(unshare)?;
        if cached.generation == self.generation() {
            return Ok(cached.value);
        }

        let fresh = self.fetch_share(&key).await?;
        let value = fresh.value.clone();
        self.share_cache.insert(key, fresh).await;
        Ok(value)
    }

    async fn fetch_share(&self, key: &ShareKey) -> Result<Stamped<Option<FileShare>>, GatewayError> {
        let generation = self.generation();
        let value = self.shares.get_share(&key.0, &key.1).await?;
        Ok(Stamped { generation, value })
    }

    pub async fn shares_for_path(&self, path: &str) -> Result<Vec<FileShare>, GatewayError> {
        self.shares.shares_for_path(&normalize_resource(path)).await
    }

    pub async fn shares_for_user(&self, user: &str) -> Result<Vec<FileShare>, GatewayError> {
        self.shares.shares_for_user(&user.to_lowercase()).await
    }

    /// Decides whether `user` may perform `operation` on `path`.
    ///
    /// A share on the exact resource is authoritative. Without one, the generic permission
    /// derived from the operation (or [`ADMIN_PERMISSION`]) is required. Unknown operations
    /// are always denied.
    pub async fn has_access(
        &self,
        user: &str,
        path: &str,
        operation: &str,
    ) -> Result<bool, GatewayError> {
        let Ok(access) = Access::from_str(operation) else {
            debug!(user, operation, "Unknown operation denied");
            return Ok(false);
        };

        if let Some(share) = self.get_share(path, user).await? {
            return Ok(share.level >= access.required_level());
        }

        let granted = self.load_permissions(user).await?;
        Ok(granted.contains(ADMIN_PERMISSION) || granted.contains(access.fallback_permission()))
    }
}

fn build_cache<K, V>(max_capacity: u64, ttl: Duration) -> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build()
}

/// Recovers the loader error from the cache's shared handle.
fn unshare(err: Arc<GatewayError>) -> GatewayError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| GatewayError::Repository {
        message: shared.to_string().into(),
        context: Some("Cache loader error was shared with a concurrent lookup".into()),
    })
}

fn share_key(path: &str, user: &str) -> ShareKey {
    (normalize_resource(path), user.to_lowercase())
}

fn require(name: &'static str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::invalid_argument(format!("'{name}' must not be empty")));
    }
    Ok(())
}
