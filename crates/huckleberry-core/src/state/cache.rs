// # Snapshot Cache
//
// The per-child in-memory cache behind every published snapshot.
//
// ## Ownership
//
// The cache is owned by the coordinator's delivery task and mutated only
// there. Listener callbacks never touch it directly: they enqueue updates,
// and the delivery task applies them one at a time in enqueue order. This
// keeps the cache lock-free.
//
// ## Staleness
//
// Each applied update records its arrival sequence per (child, stream)
// pair. An update whose sequence is not newer than the last applied one
// for its pair is ignored, so stale data never overwrites fresh data.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::model::{ChildProfile, GrowthData, StreamKind};
use crate::state::snapshot::{ChildState, RealtimeSnapshot};

/// In-memory per-child state cache
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    /// Profiles enumerated at setup, in account order
    profiles: Vec<Arc<ChildProfile>>,

    /// Live per-child state
    children: HashMap<String, ChildState>,

    /// Last applied arrival sequence per (child, stream) pair
    last_sequence: HashMap<(String, StreamKind), u64>,
}

impl SnapshotCache {
    /// Create an empty cache for the given child profiles
    pub fn new(profiles: Vec<Arc<ChildProfile>>) -> Self {
        Self {
            profiles,
            children: HashMap::new(),
            last_sequence: HashMap::new(),
        }
    }

    /// True once any listener update has been applied
    pub fn has_data(&self) -> bool {
        !self.children.is_empty()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.children.len()
    }

    #[cfg(test)]
    fn get(&self, child_id: &str) -> Option<&ChildState> {
        self.children.get(child_id)
    }

    /// Merge one stream document into the cache
    ///
    /// Creates the child entry on first update. Health documents are reduced
    /// to their growth slice (a placeholder when no growth entry exists).
    ///
    /// # Returns
    ///
    /// `true` if the update was applied, `false` if it was stale
    pub fn apply(
        &mut self,
        child_id: &str,
        stream: StreamKind,
        document: Value,
        sequence: u64,
    ) -> bool {
        let key = (child_id.to_string(), stream);
        if let Some(&last) = self.last_sequence.get(&key)
            && sequence <= last
        {
            debug!(
                "Ignoring stale {} update for {} (seq {} <= {})",
                stream, child_id, sequence, last
            );
            return false;
        }
        self.last_sequence.insert(key, sequence);

        if !self.children.contains_key(child_id) {
            let profile = self.profile(child_id);
            if profile.is_none() {
                warn!("Received {} update for unknown child {}", stream, child_id);
            }
            self.children
                .insert(child_id.to_string(), ChildState::new(profile));
        }

        let Some(state) = self.children.get_mut(child_id) else {
            return false;
        };

        match stream {
            StreamKind::Sleep => state.sleep_status = Some(Arc::new(document)),
            StreamKind::Feed => state.feed_status = Some(Arc::new(document)),
            StreamKind::Health => {
                let growth = GrowthData::from_health_document(&document);
                if growth.is_placeholder() {
                    debug!("No growth entry in health document for {}", child_id);
                } else {
                    debug!(
                        "Growth for {}: weight={:?}, height={:?}, head={:?}",
                        child_id, growth.weight, growth.height, growth.head
                    );
                }
                state.growth_data = Some(growth);
            }
            StreamKind::Diaper => state.diaper_data = Some(Arc::new(document)),
        }

        true
    }

    /// Fresh copy of the full cache
    pub fn snapshot(&self) -> RealtimeSnapshot {
        RealtimeSnapshot::from(self.children.clone())
    }

    /// Initial snapshot used before any listener delivered data
    ///
    /// One entry per known child with an empty sleep-status placeholder and
    /// every other slice absent. Not stored in the cache.
    pub fn seed_snapshot(&self) -> RealtimeSnapshot {
        self.profiles
            .iter()
            .map(|profile| {
                let mut state = ChildState::new(Some(Arc::clone(profile)));
                state.sleep_status = Some(Arc::new(json!({})));
                (profile.uid.clone(), state)
            })
            .collect()
    }

    /// Snapshot for a fallback refresh
    ///
    /// Never overwrites listener-sourced state: once the cache holds data it
    /// is returned unchanged, otherwise the seed snapshot is returned.
    pub fn fallback_snapshot(&self) -> RealtimeSnapshot {
        if self.has_data() {
            self.snapshot()
        } else {
            self.seed_snapshot()
        }
    }

    fn profile(&self, child_id: &str) -> Option<Arc<ChildProfile>> {
        self.profiles
            .iter()
            .find(|profile| profile.uid == child_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> SnapshotCache {
        SnapshotCache::new(vec![
            Arc::new(ChildProfile::new("child_1", "First Child")),
            Arc::new(ChildProfile::new("child_2", "Second Child")),
        ])
    }

    #[test]
    fn test_apply_creates_entry_with_profile() {
        let mut cache = cache();
        assert!(!cache.has_data());

        assert!(cache.apply("child_1", StreamKind::Sleep, json!({"timer": {}}), 1));

        let state = cache.get("child_1").unwrap();
        assert_eq!(state.profile.as_ref().unwrap().name, "First Child");
        assert!(state.sleep_status.is_some());
        assert!(state.feed_status.is_none());
        assert!(state.growth_data.is_none());
        assert!(state.diaper_data.is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unknown_child_gets_entry_without_profile() {
        let mut cache = cache();
        assert!(cache.apply("stranger", StreamKind::Diaper, json!({}), 1));
        assert!(cache.get("stranger").unwrap().profile.is_none());
    }

    #[test]
    fn test_stream_slices_are_independent() {
        let mut cache = cache();
        cache.apply("child_1", StreamKind::Sleep, json!({"timer": {"active": true}}), 1);
        cache.apply("child_1", StreamKind::Feed, json!({"timer": {"active": false}}), 2);
        cache.apply("child_2", StreamKind::Sleep, json!({"timer": {"paused": true}}), 3);

        let before = cache.get("child_1").unwrap().clone();
        cache.apply("child_1", StreamKind::Diaper, json!({"prefs": {}}), 4);
        let after = cache.get("child_1").unwrap();

        assert_eq!(after.sleep_status, before.sleep_status);
        assert_eq!(after.feed_status, before.feed_status);
        assert_eq!(after.growth_data, before.growth_data);
        assert!(after.diaper_data.is_some());
        assert_eq!(
            cache.get("child_2").unwrap().sleep_status.as_deref(),
            Some(&json!({"timer": {"paused": true}}))
        );
    }

    #[test]
    fn test_stale_sequence_is_ignored() {
        let mut cache = cache();
        assert!(cache.apply("child_1", StreamKind::Feed, json!({"v": "b"}), 7));
        assert!(!cache.apply("child_1", StreamKind::Feed, json!({"v": "a"}), 6));
        assert!(!cache.apply("child_1", StreamKind::Feed, json!({"v": "a"}), 7));

        // Other pairs track their own sequence
        assert!(cache.apply("child_1", StreamKind::Sleep, json!({}), 1));

        assert_eq!(
            cache.get("child_1").unwrap().feed_status.as_deref(),
            Some(&json!({"v": "b"}))
        );
    }

    #[test]
    fn test_health_without_growth_entry_stores_placeholder() {
        let mut cache = cache();
        cache.apply("child_1", StreamKind::Health, json!({"prefs": {}}), 1);
        cache.apply("child_2", StreamKind::Health, json!({}), 2);

        assert_eq!(
            cache.get("child_1").unwrap().growth_data,
            Some(GrowthData::placeholder())
        );
        assert_eq!(
            cache.get("child_2").unwrap().growth_data,
            Some(GrowthData::placeholder())
        );
    }

    #[test]
    fn test_fallback_seeds_only_when_empty() {
        let mut cache = cache();

        let seeded = cache.fallback_snapshot();
        assert_eq!(seeded.len(), 2);
        let child = seeded.get("child_2").unwrap();
        assert_eq!(child.sleep_status.as_deref(), Some(&json!({})));
        assert!(child.feed_status.is_none());
        assert!(child.profile.is_some());

        // Seed is not stored
        assert!(!cache.has_data());

        cache.apply("child_1", StreamKind::Feed, json!({"timer": {"active": true}}), 1);
        let refreshed = cache.fallback_snapshot();
        assert_eq!(refreshed, cache.snapshot());
        assert_eq!(refreshed.len(), 1);
        assert!(refreshed.get("child_1").unwrap().sleep_status.is_none());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut cache = cache();
        cache.apply("child_1", StreamKind::Sleep, json!({"n": 1}), 1);
        let snapshot = cache.snapshot();

        cache.apply("child_1", StreamKind::Sleep, json!({"n": 2}), 2);

        assert_eq!(
            snapshot.get("child_1").unwrap().sleep_status.as_deref(),
            Some(&json!({"n": 1}))
        );
    }
}
