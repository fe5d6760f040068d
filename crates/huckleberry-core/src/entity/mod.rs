//! Entity-state projection
//!
//! Pure functions that read one child's slice of a [`RealtimeSnapshot`] and
//! compute the display state of a sensor or switch. Entities hold no state of
//! their own: project again whenever a new snapshot is published.
//!
//! ## Naming
//!
//! - `unique_id`: `<child uid>_<suffix>` (stable across renames)
//! - `entity_id`: `sensor.<slug(child name)>_<slug(entity name)>`
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut updates = coordinator.updates();
//! while let Some(snapshot) = updates.next().await {
//!     for entity in entity::project_all(coordinator.children(), &snapshot) {
//!         println!("{} = {}", entity.entity_id, entity.state);
//!     }
//! }
//! ```

pub mod sensor;
pub mod switch;

pub use switch::{SwitchEntity, SwitchKind};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::model::{ChildProfile, FeedingSide};
use crate::state::RealtimeSnapshot;

/// Computed display state of one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    /// Host entity id (e.g. `sensor.test_child_sleep_status`)
    pub entity_id: String,

    /// Stable unique id (e.g. `child_1_sleep_status`)
    pub unique_id: String,

    /// Friendly name
    pub name: String,

    /// State value
    pub state: String,

    /// Extra state attributes
    pub attributes: Map<String, Value>,

    /// Whether the entity has data to show
    pub available: bool,
}

impl EntityState {
    pub(crate) fn new(
        domain: &str,
        profile: &ChildProfile,
        suffix: &str,
        entity_name: Option<&str>,
        state: impl Into<String>,
    ) -> Self {
        let (name, entity_id) = match entity_name {
            Some(entity_name) => (
                format!("{} {}", profile.name, entity_name),
                format!("{}.{}_{}", domain, slugify(&profile.name), slugify(entity_name)),
            ),
            None => (
                profile.name.clone(),
                format!("{}.{}", domain, slugify(&profile.name)),
            ),
        };

        Self {
            entity_id,
            unique_id: format!("{}_{}", profile.uid, suffix),
            name,
            state: state.into(),
            attributes: Map::new(),
            available: true,
        }
    }

    pub(crate) fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub(crate) fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Attribute by name
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Project every entity for every child
///
/// Yields the account-level children sensor first, then per child its
/// sensors and switches.
pub fn project_all(children: &[Arc<ChildProfile>], snapshot: &RealtimeSnapshot) -> Vec<EntityState> {
    let mut entities = vec![sensor::children(children)];
    for child in children {
        entities.extend(project_child(child, snapshot));
    }
    entities
}

/// Project every entity of one child
pub fn project_child(profile: &ChildProfile, snapshot: &RealtimeSnapshot) -> Vec<EntityState> {
    vec![
        sensor::profile(profile),
        sensor::growth(profile, snapshot),
        sensor::last_diaper(profile, snapshot),
        sensor::sleep_status(profile, snapshot),
        sensor::feeding_status(profile, snapshot),
        sensor::last_feeding_side(profile, snapshot),
        sensor::previous_feed_start(profile, snapshot),
        sensor::previous_sleep_start(profile, snapshot),
        sensor::previous_sleep_end(profile, snapshot),
        SwitchEntity::new(profile.clone(), SwitchKind::SleepTracking).project(snapshot),
        SwitchEntity::new(profile.clone(), SwitchKind::Feeding(FeedingSide::Left)).project(snapshot),
        SwitchEntity::new(profile.clone(), SwitchKind::Feeding(FeedingSide::Right)).project(snapshot),
    ]
}

/// Lowercase, `_`-separated slug of a display name
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// Object under `key`, if the value is an object
pub(crate) fn object<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a Map<String, Value>> {
    value?.get(key)?.as_object()
}

/// Truthiness of a boolean flag (absent means false)
pub(crate) fn flag(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// `timer` object of a sleep or feed document
pub(crate) fn timer(document: Option<&Value>) -> Option<&Map<String, Value>> {
    object(document, "timer")
}

/// `prefs` object of a stream document
pub(crate) fn prefs(document: Option<&Value>) -> Option<&Map<String, Value>> {
    object(document, "prefs")
}

/// Timer is running (active and not paused)
pub(crate) fn is_running(timer: &Map<String, Value>) -> bool {
    flag(timer, "active") && !flag(timer, "paused")
}

/// Most recent known feeding side of a feed document
///
/// Precedence: `timer.activeSide`, then `timer.lastSide`, then
/// `prefs.lastSide.lastSide`. Values other than left/right (such as
/// `"none"`) are skipped.
pub fn resolve_last_side(feed_document: Option<&Value>) -> Option<FeedingSide> {
    let side_at = |map: Option<&Map<String, Value>>, key: &str| {
        map.and_then(|map| map.get(key))
            .and_then(Value::as_str)
            .and_then(FeedingSide::parse)
    };

    let timer = timer(feed_document);
    let prefs_last_side = prefs(feed_document)
        .and_then(|prefs| prefs.get("lastSide"))
        .and_then(Value::as_object);

    side_at(timer, "activeSide")
        .or_else(|| side_at(timer, "lastSide"))
        .or_else(|| side_at(prefs_last_side, "lastSide"))
}

/// UTC time from seconds since epoch
pub(crate) fn datetime_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// `%Y-%m-%d %H:%M` rendering of an epoch-seconds value
pub(crate) fn format_minutes(secs: &Value) -> Option<String> {
    let time = datetime_from_secs(secs.as_f64()?)?;
    Some(time.format("%Y-%m-%d %H:%M").to_string())
}

/// RFC 3339 rendering of an epoch-seconds value
pub(crate) fn format_iso(secs: &Value) -> Option<String> {
    Some(datetime_from_secs(secs.as_f64()?)?.to_rfc3339())
}
