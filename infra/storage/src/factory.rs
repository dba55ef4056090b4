use crate::backend::{Backend, BackendConfig, BackendKind};
use crate::error::StorageError;
use crate::ftp::{FtpBackend, FtpConnector};
use crate::local::LocalBackend;
use crate::memory::MemoryBackend;
use crate::object::ObjectStoreBackend;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds and initializes backends from a type tag and a configuration map.
///
/// This is the single place that knows every [`BackendKind`]; adding a variant means
/// adding an arm to [`BackendFactory::create`].
///
/// ```rust
/// use filegate_storage::{BackendConfig, BackendFactory};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), filegate_storage::StorageError> {
/// let backend = BackendFactory::new().create("InMemory", "scratch", &BackendConfig::new()).await?;
/// backend.write("hello.txt", b"hi").await?;
/// assert_eq!(backend.read("hello.txt").await?, b"hi");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct BackendFactory {
    ftp_connector: Option<Arc<dyn FtpConnector>>,
}

impl BackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `connector` for every FTP backend this factory creates.
    #[must_use]
    pub fn with_ftp_connector(mut self, connector: Arc<dyn FtpConnector>) -> Self {
        self.ftp_connector = Some(connector);
        self
    }

    /// Whether `tag` names a known backend type.
    #[must_use]
    pub fn supports(tag: &str) -> bool {
        tag.trim().parse::<BackendKind>().is_ok()
    }

    /// Constructs the backend selected by `kind_tag` and initializes it with `config`.
    ///
    /// # Errors
    /// - [`StorageError::InvalidArgument`] if `kind_tag` or `id` is blank.
    /// - [`StorageError::UnsupportedType`] for unknown tags.
    /// - Whatever the backend's `initialize` reports, typically
    ///   [`StorageError::MissingConfig`].
    pub async fn create(
        &self,
        kind_tag: &str,
        id: &str,
        config: &BackendConfig,
    ) -> Result<Arc<dyn Backend>, StorageError> {
        let kind = Self::parse_kind(kind_tag)?;
        let id = id.trim();
        if id.is_empty() {
            return Err(StorageError::InvalidArgument {
                message: "backend id".into(),
                context: Some("Backend id must not be empty".into()),
            });
        }

        let backend: Arc<dyn Backend> = match kind {
            BackendKind::Local => Arc::new(LocalBackend::new(id)),
            BackendKind::Memory => Arc::new(MemoryBackend::new(id)),
            BackendKind::ObjectStore => Arc::new(ObjectStoreBackend::new(id)),
            BackendKind::Ftp => Arc::new(match &self.ftp_connector {
                Some(connector) => FtpBackend::with_connector(id, Arc::clone(connector)),
                None => FtpBackend::new(id),
            }),
        };

        if let Err(err) = backend.initialize(config).await {
            warn!(backend = id, kind = %kind, error = %err, "Backend initialization failed");
            return Err(err);
        }

        debug!(backend = id, kind = %kind, "Backend created");
        Ok(backend)
    }

    fn parse_kind(tag: &str) -> Result<BackendKind, StorageError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(StorageError::InvalidArgument {
                message: "backend type".into(),
                context: Some("Backend type must not be empty".into()),
            });
        }
        tag.parse::<BackendKind>().map_err(|_| StorageError::UnsupportedType {
            message: tag.to_owned().into(),
            context: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn unknown_tags_are_unsupported() {
        let err = BackendFactory::new().create("tape", "t", &BackendConfig::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        assert!(!BackendFactory::supports("tape"));
        assert!(BackendFactory::supports(" Disk "));
    }

    #[tokio::test]
    async fn blank_inputs_are_invalid() {
        let factory = BackendFactory::new();

        let err = factory.create("", "id", &BackendConfig::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = factory.create("memory", "  ", &BackendConfig::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn missing_required_keys_are_reported() {
        let factory = BackendFactory::new();

        let err = factory.create("local", "l", &BackendConfig::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingConfig { .. }));

        let err = factory.create("ftp", "f", &BackendConfig::from([("host", "h")])).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingConfig { .. }));
    }

    #[tokio::test]
    async fn created_backend_carries_id_and_kind() {
        let backend = BackendFactory::new().create("mem", "scratch", &BackendConfig::new()).await.unwrap();
        assert_eq!(backend.id(), "scratch");
        assert_eq!(backend.kind(), BackendKind::Memory);
        assert!(backend.test_connection().await.unwrap());
    }
}
