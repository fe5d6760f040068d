// # Realtime State
//
// The snapshot types observers receive and the cache the coordinator
// merges stream updates into.

pub mod cache;
pub mod snapshot;

pub use cache::SnapshotCache;
pub use snapshot::{ChildState, RealtimeSnapshot};
