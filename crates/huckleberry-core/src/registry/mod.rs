//! Plugin-based backend registry
//!
//! The registry maps backend type names to [`TrackerApiFactory`] objects, so
//! the daemon builds its vendor client from configuration without
//! hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use huckleberry_core::registry::BackendRegistry;
//! use huckleberry_core::config::HuckleberryConfig;
//!
//! let registry = BackendRegistry::with_builtin();
//! let config = HuckleberryConfig::new("parent@example.com", "secret");
//! let api = registry.create_backend(&config).await?;
//! ```
//!
//! ## Registration
//!
//! Out-of-tree backends register under the name their `Custom` config uses:
//!
//! ```rust,ignore
//! registry.register_backend("cloud", Arc::new(CloudFactory));
//! ```

use crate::config::HuckleberryConfig;
use crate::error::{Error, Result};
use crate::traits::{TrackerApi, TrackerApiFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Backend registry for plugin-based tracker client creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct BackendRegistry {
    /// Registered backend factories
    backends: RwLock<HashMap<String, Arc<dyn TrackerApiFactory>>>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `memory` backend registered
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        crate::backend::register(&registry);
        registry
    }

    /// Register a backend factory
    ///
    /// # Parameters
    ///
    /// - `name`: Backend type name (e.g., "memory")
    /// - `factory`: Factory object for creating client instances
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register_backend(&self, name: impl Into<String>, factory: Arc<dyn TrackerApiFactory>) {
        let name = name.into();
        let mut backends = self.backends.write().unwrap_or_else(PoisonError::into_inner);
        backends.insert(name, factory);
    }

    /// Create a tracker client from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn TrackerApi>)`: Created client
    /// - `Err(Error)`: If the backend type is not registered or creation fails
    pub async fn create_backend(&self, config: &HuckleberryConfig) -> Result<Arc<dyn TrackerApi>> {
        let backend_type = config.backend.type_name();

        // Release the lock before calling async create
        let factory = {
            let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
            backends
                .get(backend_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown backend type: {}", backend_type)))?
        };

        let api = factory.create(config).await?;
        tracing::debug!("Created {} backend", api.provider_name());
        Ok(api)
    }

    /// List all registered backend types
    pub fn list_backends(&self) -> Vec<String> {
        let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend type is registered
    pub fn has_backend(&self, name: &str) -> bool {
        let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
        backends.contains_key(name)
    }
}
