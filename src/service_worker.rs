//! Service worker handshake.
//!
//! The core only needs a handle that may yield a provider id once the
//! service worker lookup resolved; registration lives elsewhere.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicI64, Ordering};

use url::Url;

/// The per-navigation end of a service worker lookup.
pub trait ServiceWorkerNavigationHandle {
    /// The provider id, `None` while unresolved or when no worker controls
    /// the navigation.
    fn provider_id(&self) -> Option<i64>;
}

/// Creates service worker handles for navigations.
pub trait ServiceWorkerContext {
    fn create_navigation_handle(&self, url: &Url) -> Box<dyn ServiceWorkerNavigationHandle>;
}

static PROVIDER_ID_COUNTER: AtomicI64 = AtomicI64::new(1);

/// A handle resolved by whoever holds the other end of the shared cell.
#[derive(Clone, Debug, Default)]
pub struct SharedProviderHandle {
    provider_id: Rc<Cell<Option<i64>>>,
}

impl SharedProviderHandle {
    /// Resolve the handle with a fresh provider id.
    pub fn resolve(&self) -> i64 {
        let id = PROVIDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.provider_id.set(Some(id));
        id
    }
}

impl ServiceWorkerNavigationHandle for SharedProviderHandle {
    fn provider_id(&self) -> Option<i64> {
        self.provider_id.get()
    }
}

/// Resolves a provider for every URL under one of its registered scopes.
#[derive(Debug, Default)]
pub struct ScopedServiceWorkerContext {
    scopes: Vec<Url>,
}

impl ScopedServiceWorkerContext {
    pub fn new(scopes: Vec<Url>) -> Self {
        Self { scopes }
    }

    fn is_in_scope(&self, url: &Url) -> bool {
        self.scopes
            .iter()
            .any(|scope| url.origin() == scope.origin() && url.path().starts_with(scope.path()))
    }
}

impl ServiceWorkerContext for ScopedServiceWorkerContext {
    fn create_navigation_handle(&self, url: &Url) -> Box<dyn ServiceWorkerNavigationHandle> {
        let handle = SharedProviderHandle::default();
        if self.is_in_scope(url) {
            let id = handle.resolve();
            log::debug!("ServiceWorker: provider {id} controls {url}");
        }
        Box::new(handle)
    }
}
