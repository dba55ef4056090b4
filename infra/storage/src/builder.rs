use crate::backend::Backend;
use crate::cache::{CacheSettings, CachingBackend};
use private::Sealed;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct NoInner;
#[derive(Debug)]
pub struct WithInner(Arc<dyn Backend>);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoInner {}
impl Sealed for WithInner {}

/// Typestate builder for [`CachingBackend`]; `build` is only available once the wrapped
/// backend has been supplied.
#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct CachingBackendBuilder<S: Sealed = NoInner> {
    state: S,
    settings: CacheSettings,
}

#[allow(private_bounds)]
impl<S: Sealed> CachingBackendBuilder<S> {
    #[must_use = "Sets how long file contents stay cached"]
    pub const fn content_ttl(mut self, ttl: Duration) -> Self {
        self.settings.content_ttl = ttl;
        self
    }

    #[must_use = "Sets how long directory listings stay cached"]
    pub const fn listing_ttl(mut self, ttl: Duration) -> Self {
        self.settings.listing_ttl = ttl;
        self
    }

    #[must_use = "Sets how long a connection test result stays cached"]
    pub const fn connection_ttl(mut self, ttl: Duration) -> Self {
        self.settings.connection_ttl = ttl;
        self
    }

    #[must_use = "Sets the maximum number of entries per cache"]
    pub const fn max_capacity(mut self, capacity: u64) -> Self {
        self.settings.max_capacity = capacity;
        self
    }

    #[must_use = "Replaces all cache settings at once"]
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    fn transition<N: Sealed>(self, state: N) -> CachingBackendBuilder<N> {
        CachingBackendBuilder { state, settings: self.settings }
    }
}

impl CachingBackendBuilder<NoInner> {
    #[must_use = "Creates a new caching builder with default settings"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the backend whose results are cached"]
    pub fn inner(self, backend: Arc<dyn Backend>) -> CachingBackendBuilder<WithInner> {
        self.transition(WithInner(backend))
    }
}

impl CachingBackendBuilder<WithInner> {
    /// Wraps the backend. The decorator reports the inner backend's id and kind.
    #[must_use]
    pub fn build(self) -> CachingBackend {
        CachingBackend::new(self.state.0, &self.settings)
    }
}
