//! Switch projections
//!
//! A switch reflects a running timer and maps turning it on or off to a
//! remote action. The state only changes once the stream listener reports
//! the timer change back.

use serde_json::{Map, Value, json};

use super::{EntityState, flag, format_iso, is_running, prefs, resolve_last_side, timer};
use crate::actions::Action;
use crate::model::{ChildProfile, FeedingSide, StreamKind};
use crate::state::RealtimeSnapshot;

const DOMAIN: &str = "switch";

/// Which timer a switch controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    /// Sleep timer
    SleepTracking,

    /// Feeding timer on one side
    Feeding(FeedingSide),
}

impl SwitchKind {
    fn stream(&self) -> StreamKind {
        match self {
            SwitchKind::SleepTracking => StreamKind::Sleep,
            SwitchKind::Feeding(_) => StreamKind::Feed,
        }
    }

    fn suffix(&self) -> String {
        match self {
            SwitchKind::SleepTracking => "sleep_tracking".to_string(),
            SwitchKind::Feeding(side) => format!("feeding_{}", side),
        }
    }

    fn entity_name(&self) -> String {
        match self {
            SwitchKind::SleepTracking => "Sleep tracking".to_string(),
            SwitchKind::Feeding(side) => format!("Feeding {}", side),
        }
    }
}

/// A child's timer switch
#[derive(Debug, Clone)]
pub struct SwitchEntity {
    profile: ChildProfile,
    kind: SwitchKind,
}

impl SwitchEntity {
    pub fn new(profile: ChildProfile, kind: SwitchKind) -> Self {
        Self { profile, kind }
    }

    pub fn kind(&self) -> SwitchKind {
        self.kind
    }

    /// Child this switch targets
    pub fn child_id(&self) -> &str {
        &self.profile.uid
    }

    fn document<'a>(&self, snapshot: &'a RealtimeSnapshot) -> Option<&'a Value> {
        snapshot
            .get(&self.profile.uid)
            .and_then(|child| child.document(self.kind.stream()))
    }

    /// Whether the controlled timer is running
    ///
    /// A feeding switch is on only while its own side is the active one.
    pub fn is_on(&self, snapshot: &RealtimeSnapshot) -> bool {
        let document = self.document(snapshot);
        let Some(timer) = timer(document) else {
            return false;
        };

        match self.kind {
            SwitchKind::SleepTracking => is_running(timer),
            SwitchKind::Feeding(side) => {
                is_running(timer) && resolve_last_side(document) == Some(side)
            }
        }
    }

    /// Action issued when the switch is turned on
    pub fn turn_on_action(&self) -> Action {
        match self.kind {
            SwitchKind::SleepTracking => Action::StartSleep,
            SwitchKind::Feeding(side) => Action::StartFeeding { side },
        }
    }

    /// Action issued when the switch is turned off
    pub fn turn_off_action(&self) -> Action {
        match self.kind {
            SwitchKind::SleepTracking => Action::CompleteSleep,
            SwitchKind::Feeding(_) => Action::CompleteFeeding,
        }
    }

    /// Compute the switch state from a snapshot
    pub fn project(&self, snapshot: &RealtimeSnapshot) -> EntityState {
        let on = self.is_on(snapshot);
        let attrs = match self.kind {
            SwitchKind::SleepTracking => self.sleep_attributes(snapshot, on),
            SwitchKind::Feeding(side) => self.feeding_attributes(snapshot, side, on),
        };

        EntityState::new(
            DOMAIN,
            &self.profile,
            &self.kind.suffix(),
            Some(&self.kind.entity_name()),
            if on { "on" } else { "off" },
        )
        .with_attributes(attrs)
    }

    fn sleep_attributes(&self, snapshot: &RealtimeSnapshot, on: bool) -> Map<String, Value> {
        let document = self.document(snapshot);
        let mut attrs = Map::new();

        if on
            && let Some(start) = timer(document)
                .and_then(|timer| timer.get("timerStartTime"))
                .and_then(Value::as_f64)
            && let Some(start) = format_iso(&json!(start / 1000.0))
        {
            attrs.insert("start_time".to_string(), json!(start));
        }

        if let Some(last) = prefs(document)
            .and_then(|prefs| prefs.get("lastSleep"))
            .and_then(Value::as_object)
        {
            if let Some(duration) = last.get("duration").and_then(Value::as_f64) {
                let minutes = (duration / 60.0 * 10.0).round() / 10.0;
                attrs.insert("last_sleep_duration_minutes".to_string(), json!(minutes));
            }
            if let Some(start) = last.get("start").and_then(format_iso) {
                attrs.insert("last_sleep_start".to_string(), json!(start));
            }
        }

        attrs
    }

    fn feeding_attributes(
        &self,
        snapshot: &RealtimeSnapshot,
        side: FeedingSide,
        on: bool,
    ) -> Map<String, Value> {
        let document = self.document(snapshot);
        let mut attrs = Map::new();
        attrs.insert("side".to_string(), json!(side.as_str()));

        if on && let Some(timer) = timer(document) {
            if let Some(seconds) = timer.get("timestamp").and_then(|t| t.get("seconds")) {
                attrs.insert("feeding_start".to_string(), seconds.clone());
            }
            let key = match side {
                FeedingSide::Left => "leftDuration",
                FeedingSide::Right => "rightDuration",
            };
            attrs.insert(
                "duration_seconds".to_string(),
                timer.get(key).cloned().unwrap_or_else(|| json!(0)),
            );
        }

        if let Some(nursing) = prefs(document)
            .and_then(|prefs| prefs.get("lastNursing"))
            .and_then(Value::as_object)
        {
            for (from, to) in [
                ("leftDuration", "last_nursing_left_duration"),
                ("rightDuration", "last_nursing_right_duration"),
                ("start", "last_nursing_timestamp"),
            ] {
                if let Some(value) = nursing.get(from) {
                    attrs.insert(to.to_string(), value.clone());
                }
            }
        }

        // Expose whether the feed is paused on this side
        if let Some(timer) = timer(document)
            && flag(timer, "active")
            && resolve_last_side(document) == Some(side)
        {
            attrs.insert("is_paused".to_string(), json!(flag(timer, "paused")));
        }

        attrs
    }
}
