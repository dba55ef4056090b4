use crate::acl::{Access, AccessControl};
use crate::config::SandboxDefaults;
use crate::error::GatewayError;
use crate::repository::PolicyRepository;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Normalizes a resource path to the `/a/b` form used by policies, shares and audit records.
///
/// Backslashes become slashes, empty and `.` segments are dropped. `..` segments are kept
/// verbatim; rejecting them is [`SandboxGuard::validate_access`]'s job.
#[must_use]
pub fn normalize_resource(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in path.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".") {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

fn has_traversal(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Validates (user, path, operation) triples before any backend is touched.
#[derive(Debug)]
pub struct SandboxGuard {
    policies: Arc<dyn PolicyRepository>,
    defaults: SandboxDefaults,
    acl: Arc<AccessControl>,
}

impl SandboxGuard {
    #[must_use]
    pub fn new(
        policies: Arc<dyn PolicyRepository>,
        defaults: SandboxDefaults,
        acl: Arc<AccessControl>,
    ) -> Self {
        Self { policies, defaults, acl }
    }

    #[must_use]
    pub fn acl(&self) -> &Arc<AccessControl> {
        &self.acl
    }

    /// Runs the checks in order and stops at the first failure. Every rejection is
    /// [`GatewayError::Unauthorized`]; repository failures propagate as they are.
    pub async fn validate_access(
        &self,
        user: &str,
        path: &str,
        operation: &str,
    ) -> Result<(), GatewayError> {
        if user.trim().is_empty() {
            return Err(GatewayError::unauthorized("missing user", path));
        }
        if path.trim().is_empty() {
            return Err(GatewayError::unauthorized("missing path", path));
        }
        if has_traversal(path) {
            return Err(GatewayError::unauthorized("traversal", path));
        }

        let normalized = normalize_resource(path);
        let policy = match self.policies.get_policy(user).await? {
            Some(policy) => policy,
            None => self.defaults.policy_for(user),
        };

        let mutating = Access::from_str(operation).is_ok_and(Access::is_mutating);
        if policy.read_only && mutating {
            return Err(GatewayError::unauthorized("read-only policy", &normalized));
        }
        if normalized.len() > policy.max_path_length {
            return Err(GatewayError::unauthorized("path too long", &normalized));
        }

        let leaf = normalized.rsplit('/').next().unwrap_or_default();
        if let Some(ext) = Path::new(leaf).extension().and_then(|e| e.to_str())
            && policy.blocks_extension(ext)
        {
            return Err(GatewayError::unauthorized("blocked extension", &normalized));
        }
        if !policy.allow_dotfiles && leaf.starts_with('.') {
            return Err(GatewayError::unauthorized("dot-file", &normalized));
        }

        if !self.acl.has_access(user, &normalized, operation).await? {
            return Err(GatewayError::unauthorized("access denied", &normalized));
        }

        debug!(user, path = %normalized, operation, "Access validated");
        Ok(())
    }
}
