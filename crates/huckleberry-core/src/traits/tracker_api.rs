// # Tracker API Trait
//
// Defines the boundary to the vendor baby-tracking service.
//
// ## Blocking Client
//
// Every method is a blocking call: it may wait on network I/O. The core
// never calls these methods from an async task directly. It hands them to
// the worker pool (see `crate::executor::run_blocking`) and awaits the result.
//
// ## Listener Callbacks
//
// `register_listener` installs a callback that the implementation may invoke
// from any thread, at any time, until `stop_all_listeners` is called. The
// callback receives the full raw document of the stream on every change.
//
// ## Usage
//
// ```rust,ignore
// use huckleberry_core::TrackerApi;
//
// fn start(api: &dyn TrackerApi) -> huckleberry_core::Result<()> {
//     api.authenticate()?;
//     for child in api.get_children()? {
//         api.start_sleep(&child.uid)?;
//     }
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::HuckleberryConfig;
use crate::error::Result;
use crate::model::{ChildProfile, DiaperEntry, FeedingSide, GrowthEntry, StreamKind};

/// Callback invoked with the raw document of one child's stream
pub type StreamCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Trait for vendor API clients
///
/// # Thread Safety
///
/// Implementations must be safe to call concurrently from worker-pool
/// threads.
///
/// # Errors
///
/// - `Error::Authentication`: credentials rejected
/// - `Error::TransientNetwork`: connectivity failure
/// - `Error::UnknownChild`: child id not on this account
///
/// Actions are fire-and-forget: their effect is observed later through the
/// listener of the affected stream.
pub trait TrackerApi: Send + Sync {
    /// Get the backend name (e.g., "memory")
    fn provider_name(&self) -> &'static str;

    /// Sign in with the configured credentials
    fn authenticate(&self) -> Result<()>;

    /// Enumerate the children on the account
    fn get_children(&self) -> Result<Vec<ChildProfile>>;

    /// Register a realtime listener for one child's stream
    fn register_listener(
        &self,
        child_id: &str,
        stream: StreamKind,
        callback: StreamCallback,
    ) -> Result<()>;

    /// Refresh the session if it is near expiry
    fn maintain_session(&self) -> Result<()>;

    /// Deregister every listener
    fn stop_all_listeners(&self) -> Result<()>;

    fn start_sleep(&self, child_id: &str) -> Result<()>;
    fn pause_sleep(&self, child_id: &str) -> Result<()>;
    fn resume_sleep(&self, child_id: &str) -> Result<()>;
    fn cancel_sleep(&self, child_id: &str) -> Result<()>;
    fn complete_sleep(&self, child_id: &str) -> Result<()>;

    fn start_feeding(&self, child_id: &str, side: FeedingSide) -> Result<()>;
    fn pause_feeding(&self, child_id: &str) -> Result<()>;

    /// Resume a paused feeding, on `side` or on the side it was paused on
    fn resume_feeding(&self, child_id: &str, side: Option<FeedingSide>) -> Result<()>;
    fn switch_feeding_side(&self, child_id: &str) -> Result<()>;
    fn cancel_feeding(&self, child_id: &str) -> Result<()>;
    fn complete_feeding(&self, child_id: &str) -> Result<()>;

    fn log_diaper(&self, child_id: &str, entry: &DiaperEntry) -> Result<()>;
    fn log_growth(&self, child_id: &str, entry: &GrowthEntry) -> Result<()>;
}

/// Helper trait for constructing tracker clients from configuration
#[async_trait]
pub trait TrackerApiFactory: Send + Sync {
    /// Create a TrackerApi instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Full bridge configuration (account and backend)
    ///
    /// # Returns
    ///
    /// A shared TrackerApi trait object
    async fn create(&self, config: &HuckleberryConfig) -> Result<Arc<dyn TrackerApi>>;
}
