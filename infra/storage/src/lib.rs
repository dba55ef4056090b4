//! Interchangeable storage backends behind one async capability.
//!
//! Every storage system is reached through the [`Backend`] trait: whole-file `read`,
//! `write` and `delete`, directory `list`ing, `exists`/`stat` lookups and a connection test.
//! Paths are root-relative and accepted with either separator style.
//!
//! # Core Features
//!
//! - **Local**: a jailed directory on disk with canonical-path traversal protection and
//!   atomic (temp file + `fsync` + `rename`) writes. Orphaned temp files are purged on
//!   initialization.
//! - **Memory**: a concurrent map living as long as the process, keyed case-insensitively.
//! - **Object store**: a single bucket through `object_store`, with S3-compatible
//!   endpoints; deleting an absent key succeeds.
//! - **FTP**: pooled sessions over `suppaftp` that reconnect once when a session drops.
//! - **Caching**: [`CachingBackend`] decorates any backend with TTL caches for contents,
//!   listings and connection status.
//!
//! Backends are selected at runtime with a type tag through [`BackendFactory`].
//!
//! # Examples
//!
//! ```rust
//! use filegate_storage::{Backend, BackendConfig, BackendFactory, CachingBackend, StorageError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StorageError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     # let root = tmp.path().join("data");
//!     let config = BackendConfig::new().with("basePath", root.display().to_string());
//!     let local = BackendFactory::new().create("local", "docs", &config).await?;
//!
//!     let cached = CachingBackend::builder().inner(local).build();
//!     cached.write("reports/q1.txt", b"revenue").await?;
//!     assert_eq!(cached.read("reports\\q1.txt").await?, b"revenue");
//!
//!     // Leaving the base path is rejected before any I/O.
//!     assert!(cached.read("../../etc/passwd").await.is_err());
//!     Ok(())
//! }
//! ```

mod backend;
mod builder;
mod cache;
mod error;
mod factory;
mod ftp;
mod local;
mod maintenance;
mod memory;
mod object;
pub mod path;

pub use backend::{Backend, BackendConfig, BackendKind, FileStat};
pub use builder::CachingBackendBuilder;
pub use cache::{CacheSettings, CachingBackend};
pub use error::{ErrorKind, StorageError, StorageErrorExt};
pub use factory::BackendFactory;
#[cfg(feature = "ftp")]
pub use ftp::SuppaFtpConnector;
pub use ftp::{FtpBackend, FtpConnector, FtpEntry, FtpSession, FtpSettings};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use object::ObjectStoreBackend;
