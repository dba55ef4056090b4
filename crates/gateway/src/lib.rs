//! Security gateway over `filegate` storage backends.
//!
//! Every file operation flows through three layers:
//!
//! - **[`SecurityProxy`]**: validates the call with the [`SandboxGuard`] (traversal,
//!   per-user policy, then [`AccessControl`]) and writes an audit record for the decision
//!   and for action failures.
//! - **[`Router`]**: resolves the backend from the [`BackendRegistry`] and executes a named
//!   operation, answering with a uniform [`OperationResult`].
//! - **[`BackendRegistry`]**: owns the live backends, mirrors them into the catalog and
//!   notifies [`RegistryObserver`]s.
//!
//! [`FileGateway`] composes the proxy and the router. Persistence is reached through the
//! traits in [`repository`]; in-memory implementations ship in [`repository::memory`].
//!
//! # Examples
//!
//! ```rust
//! use filegate_gateway::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GatewayError> {
//!     let registry = Arc::new(BackendRegistry::new(Arc::new(InMemoryCatalog::new())));
//!     registry.create_and_register("memory", "scratch", BackendConfig::new()).await?;
//!
//!     let acl = Arc::new(AccessControl::new(
//!         Arc::new(InMemoryPermissions::new()),
//!         Arc::new(InMemoryShares::new()),
//!     ));
//!     acl.grant("alice", "write").await?;
//!     acl.grant("alice", "read").await?;
//!
//!     let sandbox = Arc::new(SandboxGuard::new(
//!         Arc::new(InMemoryPolicies::new()),
//!         SandboxDefaults::default(),
//!         acl,
//!     ));
//!     let proxy = SecurityProxy::new(sandbox, Arc::new(InMemoryAudit::new()));
//!     let gateway = FileGateway::new(proxy, Router::new(registry));
//!
//!     gateway.write("alice", "scratch", "notes/today.txt", b"ship it").await?;
//!     assert_eq!(gateway.read("alice", "scratch", "notes/today.txt").await?, b"ship it");
//!
//!     // Traversal is rejected before the backend is touched.
//!     assert!(gateway.read("alice", "scratch", "../secrets").await.is_err());
//!     Ok(())
//! }
//! ```

pub mod acl;
pub mod config;
mod error;
mod gateway;
pub mod observer;
pub mod prelude;
pub mod proxy;
pub mod registry;
pub mod repository;
pub mod router;
pub mod sandbox;

pub use acl::{Access, AccessControl};
pub use error::{GatewayError, GatewayErrorExt};
pub use gateway::FileGateway;
pub use observer::{AuditTrailObserver, MetricsObserver, RegistryObserver};
pub use proxy::SecurityProxy;
pub use registry::{BackendRegistry, LoadReport};
pub use router::{Operation, OperationResult, Router};
pub use sandbox::SandboxGuard;

pub use nanoid::nanoid;

// Alphabet excludes visually ambiguous characters (I, O, l, 0, 1).
pub const SAFE_ALPHABET: &[char; 55] = &[
    '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L',
    'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b', 'c', 'd', 'e', 'f',
    'g', 'h', 'j', 'k', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Generates an unambiguous `NanoID`, used for audit record ids.
#[macro_export]
macro_rules! safe_nanoid {
    () => {
        $crate::nanoid!(12, $crate::SAFE_ALPHABET)
    };
    ($size:expr) => {
        $crate::nanoid!($size, $crate::SAFE_ALPHABET)
    };
}
