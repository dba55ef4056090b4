use crate::error::GatewayError;
use crate::repository::{AuditRecord, AuditRepository, AuditStatus};
use crate::sandbox::{SandboxGuard, normalize_resource};
use crate::safe_nanoid;
use chrono::{DateTime, Utc};
use filegate_logger::AUDIT_FALLBACK_TARGET;
use std::sync::Arc;
use tracing::{debug, warn};

/// Mandatory entry point for backend operations: authorize, execute, audit.
#[derive(Debug, Clone)]
pub struct SecurityProxy {
    sandbox: Arc<SandboxGuard>,
    audit: Arc<dyn AuditRepository>,
}

impl SecurityProxy {
    #[must_use]
    pub fn new(sandbox: Arc<SandboxGuard>, audit: Arc<dyn AuditRepository>) -> Self {
        Self { sandbox, audit }
    }

    #[must_use]
    pub fn sandbox(&self) -> &Arc<SandboxGuard> {
        &self.sandbox
    }

    /// Runs `action` only if `user` may perform `operation` on `path`.
    ///
    /// A rejection is recorded `DENIED` and returned without running the action. Otherwise
    /// an `ALLOWED` record is written before the action runs and a `FAILED` record after it
    /// if it errors. Audit store failures are reported on the
    /// [`AUDIT_FALLBACK_TARGET`] tracing target and never change the outcome.
    pub async fn execute_secure<T, F, Fut>(
        &self,
        operation: &str,
        backend_id: &str,
        path: &str,
        user: &str,
        action: F,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        if let Err(rejection) = self.sandbox.validate_access(user, path, operation).await {
            self.record(operation, backend_id, path, user, AuditStatus::Denied, Some(rejection.to_string()))
                .await;
            return Err(rejection);
        }

        let resource = normalize_resource(path);
        self.record(operation, backend_id, &resource, user, AuditStatus::Allowed, None).await;

        match action().await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.record(operation, backend_id, &resource, user, AuditStatus::Failed, Some(e.to_string()))
                    .await;
                Err(e)
            },
        }
    }

    async fn record(
        &self,
        action: &str,
        backend_id: &str,
        resource_path: &str,
        user: &str,
        status: AuditStatus,
        reason: Option<String>,
    ) {
        let record = AuditRecord {
            id: safe_nanoid!(),
            action: action.to_owned(),
            resource_path: resource_path.to_owned(),
            backend_id: backend_id.to_owned(),
            user_id: user.to_owned(),
            status,
            reason,
            timestamp: Utc::now(),
        };
        debug!(id = %record.id, user, action, backend = backend_id, %status, "Audit record");

        if let Err(e) = self.audit.append(record.clone()).await {
            warn!(
                target: AUDIT_FALLBACK_TARGET,
                id = %record.id,
                action = %record.action,
                path = %record.resource_path,
                backend = %record.backend_id,
                user = %record.user_id,
                status = %record.status,
                reason = record.reason.as_deref().unwrap_or_default(),
                timestamp = %record.timestamp,
                error = %e,
                "Audit store rejected record"
            );
        }
    }

    pub async fn audit_trail_for_user(
        &self,
        user: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, GatewayError> {
        self.audit.query_by_user(user, since).await
    }

    pub async fn audit_trail_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditRecord>, GatewayError> {
        if from > to {
            return Err(GatewayError::invalid_argument("'from' must not be after 'to'"));
        }
        self.audit.query_by_range(from, to).await
    }
}
