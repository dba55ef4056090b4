//! Subscribers to registry lifecycle events.

use crate::error::GatewayError;
use async_trait::async_trait;
use filegate_storage::BackendKind;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Receives registry events.
///
/// Callbacks run sequentially in subscription order. An error or panic raised by one
/// observer is logged by the registry and does not reach other observers or the caller.
#[async_trait]
pub trait RegistryObserver: Send + Sync + fmt::Debug {
    /// Label used when reporting this observer's failures.
    fn name(&self) -> &str;

    async fn on_registered(&self, _backend_id: &str, _kind: BackendKind) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn on_removed(&self, _backend_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Writes every registry event as a structured log line.
#[derive(Debug, Default)]
pub struct AuditTrailObserver;

#[async_trait]
impl RegistryObserver for AuditTrailObserver {
    fn name(&self) -> &str {
        "audit-trail"
    }

    async fn on_registered(&self, backend_id: &str, kind: BackendKind) -> Result<(), GatewayError> {
        info!(event = "backend_registered", backend = backend_id, %kind, "Backend registered");
        Ok(())
    }

    async fn on_removed(&self, backend_id: &str) -> Result<(), GatewayError> {
        info!(event = "backend_removed", backend = backend_id, "Backend removed");
        Ok(())
    }
}

/// Counts registry events.
#[derive(Debug, Default)]
pub struct MetricsObserver {
    registered: AtomicU64,
    removed: AtomicU64,
}

impl MetricsObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn registered(&self) -> u64 {
        self.registered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn removed(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }

    /// Backends registered and not yet removed, as seen by this observer.
    #[must_use]
    pub fn live(&self) -> u64 {
        self.registered().saturating_sub(self.removed())
    }
}

#[async_trait]
impl RegistryObserver for MetricsObserver {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn on_registered(&self, _backend_id: &str, _kind: BackendKind) -> Result<(), GatewayError> {
        self.registered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn on_removed(&self, _backend_id: &str) -> Result<(), GatewayError> {
        self.removed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
