//! Application state shared across handlers.

use std::sync::Arc;

use crate::cache::{CatalogCache, CatalogReader};
use crate::config::ServerConfig;
use crate::store::{CatalogStore, OrderStore, Stores, UserStore};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Each instance owns its own catalog cache, so
/// two states never share cached views.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    stores: Stores,
    cache: CatalogCache,
}

impl AppState {
    /// Create application state with a fresh, empty catalog cache.
    #[must_use]
    pub fn new(config: ServerConfig, stores: Stores) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                cache: CatalogCache::new(),
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the catalog cache.
    #[must_use]
    pub fn cache(&self) -> &CatalogCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn CatalogStore {
        self.inner.stores.catalog.as_ref()
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.inner.stores.users.as_ref()
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.stores.orders.as_ref()
    }

    /// Read-through accessor for the cached catalog views.
    #[must_use]
    pub fn reader(&self) -> CatalogReader<'_> {
        CatalogReader::new(
            self.cache(),
            self.catalog(),
            self.inner.config.catalog.latest_limit,
        )
    }
}
