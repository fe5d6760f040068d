// # huckleberry-core
//
// Core library for the realtime Huckleberry baby-tracker bridge.
//
// ## Architecture Overview
//
// - **TrackerApi**: Blocking client boundary to the vendor service
// - **Coordinator**: Merges pushed stream documents into a per-child cache
//   and publishes immutable snapshots to observers
// - **ActionService**: Named remote actions (sleep, feeding, diaper, growth)
// - **entity**: Pure projection of snapshots into sensor and switch states
// - **BackendRegistry**: Plugin-based registry of tracker backends
// - **Integration**: Setup and unload of one bridged account
//
// ## Data Flow
//
// Vendor listeners fire on foreign threads. Their documents are queued to a
// single delivery task, merged per (child, stream) slice and published.
// Every blocking vendor call runs on the worker pool.

pub mod actions;
pub mod backend;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod executor;
pub mod integration;
pub mod model;
pub mod registry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use actions::{Action, ActionService};
pub use backend::MemoryTrackerApi;
pub use config::{BackendConfig, CoordinatorConfig, HuckleberryConfig};
pub use coordinator::{Coordinator, CoordinatorEvent, ListenerReport};
pub use entity::EntityState;
pub use error::{Error, Result, SetupFailure};
pub use integration::{Integration, SetupError};
pub use model::{ChildProfile, FeedingSide, GrowthData, StreamKind};
pub use registry::BackendRegistry;
pub use state::{ChildState, RealtimeSnapshot};
pub use traits::{StreamCallback, TrackerApi, TrackerApiFactory};
