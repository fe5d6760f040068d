//! Blocking hand-off to the worker pool
//!
//! Every [`TrackerApi`] call may block on network I/O. [`run_blocking`] moves
//! the call onto tokio's blocking pool and marshals the result back into the
//! calling task, so the delivery context never blocks.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::traits::TrackerApi;

/// Run a blocking tracker call on the worker pool and await its result
///
/// A panicking or cancelled worker is reported as `Error::Executor`.
pub async fn run_blocking<T, F>(api: &Arc<dyn TrackerApi>, op: F) -> Result<T>
where
    F: FnOnce(&dyn TrackerApi) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let api = Arc::clone(api);
    tokio::task::spawn_blocking(move || op(api.as_ref()))
        .await
        .map_err(|e| Error::executor(e.to_string()))?
}
