//! Live backend instances, kept in sync with the catalog repository.

use crate::error::GatewayError;
use crate::observer::RegistryObserver;
use crate::repository::{BackendRecord, CatalogRepository};
use dashmap::{DashMap, DashSet};
use filegate_storage::{Backend, BackendConfig, BackendFactory, BackendKind, CacheSettings, CachingBackend};
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of [`BackendRegistry::load_from_catalog`], by backend id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// Already registered, or of an unsupported type.
    pub skipped: Vec<String>,
    /// Creation or initialization failed.
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum RegistryEvent<'a> {
    Registered { id: &'a str, kind: BackendKind },
    Removed { id: &'a str },
}

/// Claim on an id between the registered check and the insert. Released on drop, which
/// also rolls back a registration whose catalog write failed.
#[derive(Debug)]
struct Reservation<'a> {
    pending: &'a DashSet<String>,
    id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Concurrent map of initialized backends.
///
/// Each id maps to at most one live instance. Mutations are mirrored into the catalog and
/// announced to subscribed [`RegistryObserver`]s.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: DashMap<String, Arc<dyn Backend>>,
    pending: DashSet<String>,
    catalog: Arc<dyn CatalogRepository>,
    factory: BackendFactory,
    cache: Option<CacheSettings>,
    observers: RwLock<Vec<Arc<dyn RegistryObserver>>>,
}

impl BackendRegistry {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            backends: DashMap::new(),
            pending: DashSet::new(),
            catalog,
            factory: BackendFactory::new(),
            cache: None,
            observers: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_factory(mut self, factory: BackendFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Wraps every backend inserted from now on in a [`CachingBackend`].
    #[must_use]
    pub fn with_cache(mut self, settings: CacheSettings) -> Self {
        self.cache = Some(settings);
        self
    }

    pub fn subscribe(&self, observer: Arc<dyn RegistryObserver>) {
        debug!(observer = observer.name(), "Registry observer subscribed");
        self.observers.write().push(observer);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(id).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.backends.contains_key(id)
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    fn decorate(&self, backend: Arc<dyn Backend>) -> Arc<dyn Backend> {
        match self.cache {
            Some(settings) => Arc::new(CachingBackend::builder().settings(settings).inner(backend).build()),
            None => backend,
        }
    }

    /// Claims `id` unless it is registered or being registered.
    fn reserve(&self, id: &str) -> Option<Reservation<'_>> {
        if !self.pending.insert(id.to_owned()) {
            return None;
        }
        let reservation = Reservation { pending: &self.pending, id: id.to_owned() };
        // Checked after claiming: a finished registration inserts before releasing its claim.
        if self.backends.contains_key(id) {
            return None;
        }
        Some(reservation)
    }

    /// Registers an already initialized backend under its own id.
    ///
    /// Returns `false` without side effects if the id is taken or another registration of it
    /// is in progress. Otherwise the catalog row is upserted, the instance inserted and
    /// observers notified.
    pub async fn register(
        &self,
        backend: Arc<dyn Backend>,
        config: BackendConfig,
    ) -> Result<bool, GatewayError> {
        let id = backend.id().to_owned();
        let kind = backend.kind();
        let Some(reservation) = self.reserve(&id) else {
            debug!(backend = %id, "Backend already registered");
            return Ok(false);
        };

        self.catalog.upsert(BackendRecord::new(id.clone(), kind.to_string(), config)).await?;
        self.backends.insert(id.clone(), self.decorate(backend));
        drop(reservation);

        info!(backend = %id, %kind, "Backend registered");
        self.notify(RegistryEvent::Registered { id: &id, kind }).await;
        Ok(true)
    }

    /// Builds a backend through the factory and registers it.
    ///
    /// Returns `false` before creating anything if the id is taken.
    pub async fn create_and_register(
        &self,
        kind_tag: &str,
        id: &str,
        config: BackendConfig,
    ) -> Result<bool, GatewayError> {
        if self.backends.contains_key(id.trim()) {
            return Ok(false);
        }
        let backend = self.factory.create(kind_tag, id, &config).await?;
        self.register(backend, config).await
    }

    /// Removes the instance, soft-deletes its catalog row and notifies observers.
    ///
    /// The id becomes free again: a later [`register`](Self::register) or
    /// [`create_and_register`](Self::create_and_register) reactivates its catalog row.
    pub async fn remove(&self, id: &str) -> Result<(), GatewayError> {
        if self.backends.remove(id).is_none() {
            return Err(GatewayError::NotFound {
                message: format!("backend '{id}'").into(),
                context: Some("Backend is not registered".into()),
            });
        }

        if !self.catalog.soft_delete(id).await? {
            warn!(backend = id, "Removed backend had no catalog row");
        }

        info!(backend = id, "Backend removed");
        self.notify(RegistryEvent::Removed { id }).await;
        Ok(())
    }

    /// Instantiates every active catalog row that is not registered yet.
    ///
    /// Unsupported types and rows whose backend fails to initialize are logged and skipped;
    /// only a catalog read failure is returned as an error.
    pub async fn load_from_catalog(&self) -> Result<LoadReport, GatewayError> {
        let mut report = LoadReport::default();

        for row in self.catalog.get_active().await? {
            if self.backends.contains_key(&row.id) {
                report.skipped.push(row.id);
                continue;
            }
            if !BackendFactory::supports(&row.kind) {
                warn!(backend = %row.id, kind = %row.kind, "Skipping backend of unsupported type");
                report.skipped.push(row.id);
                continue;
            }

            let backend = match self.factory.create(&row.kind, &row.id, &row.config).await {
                Ok(backend) => backend,
                Err(e) => {
                    warn!(backend = %row.id, kind = %row.kind, error = %e, "Skipping backend that failed to initialize");
                    report.failed.push(row.id);
                    continue;
                },
            };

            let kind = backend.kind();
            let Some(reservation) = self.reserve(&row.id) else {
                report.skipped.push(row.id);
                continue;
            };
            self.backends.insert(row.id.clone(), self.decorate(backend));
            drop(reservation);

            self.notify(RegistryEvent::Registered { id: &row.id, kind }).await;
            report.loaded.push(row.id);
        }

        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Backends loaded from catalog"
        );
        Ok(report)
    }

    async fn notify(&self, event: RegistryEvent<'_>) {
        let observers = self.observers.read().clone();

        for observer in observers {
            let outcome = match event {
                RegistryEvent::Registered { id, kind } => {
                    AssertUnwindSafe(observer.on_registered(id, kind)).catch_unwind().await
                },
                RegistryEvent::Removed { id } => {
                    AssertUnwindSafe(observer.on_removed(id)).catch_unwind().await
                },
            };

            match outcome {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    warn!(observer = observer.name(), event = ?event, error = %e, "Registry observer failed");
                },
                Err(_) => {
                    error!(observer = observer.name(), event = ?event, "Registry observer panicked");
                },
            }
        }
    }
}
