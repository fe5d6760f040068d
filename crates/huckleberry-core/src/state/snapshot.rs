//! Snapshot types handed to observers

use crate::model::{ChildProfile, GrowthData, StreamKind};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-child aggregate of the four independent stream slices
///
/// A slice is `Some` only once its stream delivered at least one update
/// since coordinator start. `None` means unknown, not empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildState {
    /// Static profile, `None` for updates about a child that was not
    /// enumerated at setup
    pub profile: Option<Arc<ChildProfile>>,

    /// Raw sleep document (timer and last completed sleep)
    pub sleep_status: Option<Arc<Value>>,

    /// Raw feed document (timer with side durations and last nursing)
    pub feed_status: Option<Arc<Value>>,

    /// Growth slice extracted from the health document
    pub growth_data: Option<GrowthData>,

    /// Raw diaper document (last diaper change)
    pub diaper_data: Option<Arc<Value>>,
}

impl ChildState {
    /// Empty state for a child
    pub fn new(profile: Option<Arc<ChildProfile>>) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    /// True when the slice for `stream` is present
    pub fn has_slice(&self, stream: StreamKind) -> bool {
        match stream {
            StreamKind::Sleep => self.sleep_status.is_some(),
            StreamKind::Feed => self.feed_status.is_some(),
            StreamKind::Health => self.growth_data.is_some(),
            StreamKind::Diaper => self.diaper_data.is_some(),
        }
    }

    /// Raw document for the sleep, feed or diaper slice
    ///
    /// The health slice is stored extracted; use `growth_data` for it.
    pub fn document(&self, stream: StreamKind) -> Option<&Value> {
        match stream {
            StreamKind::Sleep => self.sleep_status.as_deref(),
            StreamKind::Feed => self.feed_status.as_deref(),
            StreamKind::Health => None,
            StreamKind::Diaper => self.diaper_data.as_deref(),
        }
    }
}

/// Consolidated child id → state mapping as delivered to observers
///
/// Every published snapshot is a fresh container. Observers never hold
/// references into the live cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealtimeSnapshot {
    children: HashMap<String, ChildState>,
}

impl RealtimeSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, child_id: &str) -> Option<&ChildState> {
        self.children.get(child_id)
    }

    pub fn contains(&self, child_id: &str) -> bool {
        self.children.contains_key(child_id)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child_ids(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChildState)> {
        self.children.iter().map(|(id, state)| (id.as_str(), state))
    }
}

impl From<HashMap<String, ChildState>> for RealtimeSnapshot {
    fn from(children: HashMap<String, ChildState>) -> Self {
        Self { children }
    }
}

impl FromIterator<(String, ChildState)> for RealtimeSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, ChildState)>>(iter: I) -> Self {
        Self {
            children: iter.into_iter().collect(),
        }
    }
}
