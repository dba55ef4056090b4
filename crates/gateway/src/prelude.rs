pub use crate::acl::{ADMIN_PERMISSION, Access, AccessControl};
pub use crate::config::{GatewayConfig, SandboxDefaults, load_config};
pub use crate::error::{GatewayError, GatewayErrorExt};
pub use crate::gateway::FileGateway;
pub use crate::observer::{AuditTrailObserver, MetricsObserver, RegistryObserver};
pub use crate::proxy::SecurityProxy;
pub use crate::registry::{BackendRegistry, LoadReport};
pub use crate::repository::memory::{
    InMemoryAudit, InMemoryCatalog, InMemoryPermissions, InMemoryPolicies, InMemoryShares,
};
pub use crate::repository::{
    AuditRecord, AuditRepository, AuditStatus, BackendRecord, CatalogRepository, FileShare,
    PermissionRepository, PolicyRepository, SandboxPolicy, SharePermission, ShareRepository,
};
pub use crate::router::{Operation, OperationResult, Router};
pub use crate::sandbox::{SandboxGuard, normalize_resource};
pub use filegate_storage::{Backend, BackendConfig, BackendFactory, CacheSettings, ErrorKind};
