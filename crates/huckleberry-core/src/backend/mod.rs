//! Built-in tracker backends
//!
//! - [`MemoryTrackerApi`]: in-process backend, optionally seeded from JSON

pub mod memory;

pub use memory::{MemoryTrackerApi, MemoryTrackerApiFactory};

use std::sync::Arc;

use crate::registry::BackendRegistry;

/// Register every built-in backend with the registry
pub fn register(registry: &BackendRegistry) {
    registry.register_backend("memory", Arc::new(MemoryTrackerApiFactory));
}
