//! Sensor projections

use serde_json::{Map, Value, json};
use std::sync::Arc;

use super::{
    EntityState, flag, format_iso, format_minutes, prefs, resolve_last_side, timer,
};
use crate::model::{ChildProfile, StreamKind};
use crate::state::RealtimeSnapshot;

const DOMAIN: &str = "sensor";

/// Copy `source[from]` into `attrs[to]` when present
fn copy(attrs: &mut Map<String, Value>, to: &str, source: &Map<String, Value>, from: &str) {
    if let Some(value) = source.get(from) {
        attrs.insert(to.to_string(), value.clone());
    }
}

/// `source[key]`, or `0` when absent
fn or_zero(source: &Map<String, Value>, key: &str) -> Value {
    source.get(key).cloned().unwrap_or_else(|| json!(0))
}

/// Account-level sensor: number of children with their profiles
pub fn children(children: &[Arc<ChildProfile>]) -> EntityState {
    let profiles: Vec<Value> = children
        .iter()
        .map(|child| {
            json!({
                "uid": child.uid,
                "name": child.name,
                "birthday": child.birthday,
                "picture": child.picture,
                "gender": child.gender,
                "color": child.color,
                "created_at": child.created_at,
                "night_start": child.night_start,
                "morning_cutoff": child.morning_cutoff,
                "expected_naps": child.expected_naps,
                "categories": child.categories,
            })
        })
        .collect();

    let mut attrs = Map::new();
    attrs.insert("children".to_string(), Value::Array(profiles));
    attrs.insert(
        "child_ids".to_string(),
        children.iter().map(|c| c.uid.clone()).collect(),
    );
    attrs.insert(
        "child_names".to_string(),
        children.iter().map(|c| c.name.clone()).collect(),
    );

    EntityState {
        entity_id: "sensor.huckleberry_children".to_string(),
        unique_id: "huckleberry_children".to_string(),
        name: "Huckleberry Children".to_string(),
        state: children.len().to_string(),
        attributes: attrs,
        available: true,
    }
}

/// Child profile sensor: state is the child's name
pub fn profile(profile: &ChildProfile) -> EntityState {
    let mut attrs = Map::new();
    attrs.insert("uid".to_string(), json!(profile.uid));
    attrs.insert("name".to_string(), json!(profile.name));

    // Optional fields are skipped when unset
    if let Ok(Value::Object(fields)) = serde_json::to_value(profile) {
        for (key, value) in fields {
            if !value.is_null() && key != "uid" && key != "name" {
                attrs.insert(key, value);
            }
        }
    }

    EntityState::new(DOMAIN, profile, "profile", None, profile.name.clone()).with_attributes(attrs)
}

/// Growth sensor: measurement time of the last growth entry
///
/// "No data" until the health stream delivered, "Unknown" for a placeholder
/// without timestamp.
pub fn growth(profile: &ChildProfile, snapshot: &RealtimeSnapshot) -> EntityState {
    let growth = snapshot
        .get(&profile.uid)
        .and_then(|child| child.growth_data.as_ref());

    let Some(growth) = growth else {
        return EntityState::new(DOMAIN, profile, "growth", Some("Growth"), "No data");
    };

    let timestamp = growth.timestamp.map(|t| json!(t));
    let state = timestamp
        .as_ref()
        .and_then(format_minutes)
        .unwrap_or_else(|| "Unknown".to_string());

    let mut attrs = Map::new();
    let measurements = [
        ("weight", "weight", growth.weight, &growth.weight_units),
        ("height", "height", growth.height, &growth.height_units),
        ("head_circumference", "head", growth.head, &growth.head_units),
    ];
    for (name, prefix, value, unit) in measurements {
        if let Some(value) = value {
            attrs.insert(name.to_string(), json!(value));
            attrs.insert(format!("{}_unit", prefix), json!(unit));
            attrs.insert(format!("{}_display", prefix), json!(format!("{} {}", value, unit)));
        }
    }
    if let Some(last_measured) = timestamp.as_ref().and_then(format_iso) {
        attrs.insert("last_measured".to_string(), json!(last_measured));
    }

    EntityState::new(DOMAIN, profile, "growth", Some("Growth"), state).with_attributes(attrs)
}

/// Last diaper sensor: time of the last logged change
pub fn last_diaper(profile: &ChildProfile, snapshot: &RealtimeSnapshot) -> EntityState {
    let document = snapshot
        .get(&profile.uid)
        .and_then(|child| child.document(StreamKind::Diaper));
    let last = prefs(document)
        .and_then(|prefs| prefs.get("lastDiaper"))
        .and_then(Value::as_object)
        .filter(|last| !last.is_empty());

    let Some(last) = last else {
        return EntityState::new(DOMAIN, profile, "last_diaper", Some("Last Diaper"), "No changes logged");
    };

    let mut attrs = Map::new();
    let start = last.get("start");
    if let (Some(start), Some(time)) = (start, start.and_then(format_iso)) {
        attrs.insert("timestamp".to_string(), start.clone());
        attrs.insert("time".to_string(), json!(time));
    }
    if let Some(mode) = last.get("mode").and_then(Value::as_str).filter(|m| !m.is_empty()) {
        attrs.insert("mode".to_string(), json!(mode));
        attrs.insert("type".to_string(), json!(capitalize(mode)));
    }
    if let Some(offset) = last.get("offset").filter(|o| !o.is_null()) {
        attrs.insert("timezone_offset_minutes".to_string(), offset.clone());
    }

    let state = start
        .and_then(format_minutes)
        .unwrap_or_else(|| "Unknown".to_string());

    EntityState::new(DOMAIN, profile, "last_diaper", Some("Last Diaper"), state).with_attributes(attrs)
}

/// Sleep status sensor: sleeping | paused | none
pub fn sleep_status(profile: &ChildProfile, snapshot: &RealtimeSnapshot) -> EntityState {
    let present = snapshot.contains(&profile.uid);
    let document = snapshot
        .get(&profile.uid)
        .and_then(|child| child.document(StreamKind::Sleep));

    let mut attrs = Map::new();
    let mut state = "none";

    if let Some(timer) = timer(document) {
        let active = flag(timer, "active");
        let paused = flag(timer, "paused");

        if active {
            state = if paused { "paused" } else { "sleeping" };
            attrs.insert("is_paused".to_string(), json!(paused));
        }

        if active && !paused {
            if let Some(seconds) = timer.get("timestamp").and_then(|t| t.get("seconds")) {
                attrs.insert("sleep_start".to_string(), seconds.clone());
            }
            // timerStartTime is in milliseconds
            if let Some(start_ms) = timer.get("timerStartTime").filter(|v| !v.is_null()) {
                attrs.insert("timer_start_time_ms".to_string(), start_ms.clone());
                if let Some(ms) = start_ms.as_f64() {
                    attrs.insert("timer_start_time".to_string(), json!((ms / 1000.0).trunc() as i64));
                }
            }
        }

        if let Some(last_sleep) = prefs(document)
            .and_then(|prefs| prefs.get("lastSleep"))
            .and_then(Value::as_object)
        {
            attrs.insert(
                "last_sleep_duration_seconds".to_string(),
                last_sleep.get("duration").cloned().unwrap_or(Value::Null),
            );
            attrs.insert(
                "last_sleep_start".to_string(),
                last_sleep.get("start").cloned().unwrap_or(Value::Null),
            );
        }
    }

    EntityState::new(DOMAIN, profile, "sleep_status", Some("Sleep status"), state)
        .with_attributes(attrs)
        .with_available(present)
}

/// Feeding status sensor: feeding | paused | none
pub fn feeding_status(profile: &ChildProfile, snapshot: &RealtimeSnapshot) -> EntityState {
    let present = snapshot.contains(&profile.uid);
    let document = snapshot
        .get(&profile.uid)
        .and_then(|child| child.document(StreamKind::Feed));

    let mut attrs = Map::new();
    let mut state = "none";

    if let Some(timer) = timer(document) {
        let active = flag(timer, "active");
        let paused = flag(timer, "paused");

        if active {
            state = if paused { "paused" } else { "feeding" };
            attrs.insert("is_paused".to_string(), json!(paused));
            if let Some(seconds) = timer.get("timestamp").and_then(|t| t.get("seconds")) {
                attrs.insert("feeding_start".to_string(), seconds.clone());
            }
            attrs.insert("left_duration_seconds".to_string(), or_zero(timer, "leftDuration"));
            attrs.insert("right_duration_seconds".to_string(), or_zero(timer, "rightDuration"));
            let last_side = resolve_last_side(document)
                .map(|side| side.as_str())
                .unwrap_or("unknown");
            attrs.insert("last_side".to_string(), json!(last_side));
        }

        if let Some(nursing) = prefs(document)
            .and_then(|prefs| prefs.get("lastNursing"))
            .and_then(Value::as_object)
        {
            attrs.insert(
                "last_nursing_start".to_string(),
                nursing.get("start").cloned().unwrap_or(Value::Null),
            );
            attrs.insert(
                "last_nursing_duration_seconds".to_string(),
                nursing.get("duration").cloned().unwrap_or(Value::Null),
            );
            attrs.insert("last_nursing_left_seconds".to_string(), or_zero(nursing, "leftDuration"));
            attrs.insert("last_nursing_right_seconds".to_string(), or_zero(nursing, "rightDuration"));
        }
    }

    EntityState::new(DOMAIN, profile, "feeding_status", Some("Feeding status"), state)
        .with_attributes(attrs)
        .with_available(present)
}

/// Last feeding side sensor: Left | Right | Unknown
pub fn last_feeding_side(profile: &ChildProfile, snapshot: &RealtimeSnapshot) -> EntityState {
    let document = snapshot
        .get(&profile.uid)
        .and_then(|child| child.document(StreamKind::Feed));

    let state = resolve_last_side(document)
        .map(|side| capitalize(side.as_str()))
        .unwrap_or_else(|| "Unknown".to_string());

    EntityState::new(DOMAIN, profile, "last_feeding_side", Some("Last feeding side"), state)
        .with_available(snapshot.contains(&profile.uid))
}

/// Previous feed start sensor, from `prefs.lastNursing`
pub fn previous_feed_start(profile: &ChildProfile, snapshot: &RealtimeSnapshot) -> EntityState {
    let document = snapshot
        .get(&profile.uid)
        .and_then(|child| child.document(StreamKind::Feed));
    let nursing = prefs(document)
        .and_then(|prefs| prefs.get("lastNursing"))
        .and_then(Value::as_object);

    let mut attrs = Map::new();
    let mut state = "unknown".to_string();

    if let Some(nursing) = nursing {
        if let Some(start) = nursing.get("start").and_then(format_iso) {
            state = start;
        }
        copy(&mut attrs, "duration_seconds", nursing, "duration");
        attrs.insert("left_duration_seconds".to_string(), or_zero(nursing, "leftDuration"));
        attrs.insert("right_duration_seconds".to_string(), or_zero(nursing, "rightDuration"));
        if let Some(side) = resolve_last_side(document) {
            attrs.insert("last_side".to_string(), json!(side.as_str()));
        }
    }

    EntityState::new(DOMAIN, profile, "previous_feed_start", Some("Previous feed start"), state)
        .with_attributes(attrs)
}

fn last_sleep<'a>(profile: &ChildProfile, snapshot: &'a RealtimeSnapshot) -> Option<&'a Map<String, Value>> {
    let document = snapshot
        .get(&profile.uid)
        .and_then(|child| child.document(StreamKind::Sleep));
    prefs(document)
        .and_then(|prefs| prefs.get("lastSleep"))
        .and_then(Value::as_object)
}

/// Previous sleep start sensor, from `prefs.lastSleep`
pub fn previous_sleep_start(profile: &ChildProfile, snapshot: &RealtimeSnapshot) -> EntityState {
    let mut attrs = Map::new();
    let mut state = "unknown".to_string();

    if let Some(last) = last_sleep(profile, snapshot) {
        if let Some(start) = last.get("start").and_then(format_iso) {
            state = start;
        }
        if let Some(duration) = last.get("duration").filter(|d| !d.is_null()) {
            attrs.insert("duration_seconds".to_string(), duration.clone());
            if let Some(secs) = duration.as_f64() {
                attrs.insert("duration".to_string(), json!(format_duration(secs)));
            }
        }
    }

    EntityState::new(DOMAIN, profile, "previous_sleep_start", Some("Previous sleep start"), state)
        .with_attributes(attrs)
}

/// Previous sleep end sensor: `lastSleep.start + lastSleep.duration`
pub fn previous_sleep_end(profile: &ChildProfile, snapshot: &RealtimeSnapshot) -> EntityState {
    let mut attrs = Map::new();
    let mut state = "unknown".to_string();

    if let Some(last) = last_sleep(profile, snapshot) {
        let start = last.get("start").and_then(Value::as_f64);
        let duration = last.get("duration").and_then(Value::as_f64);
        if let (Some(start), Some(duration)) = (start, duration)
            && let Some(end) = format_iso(&json!(start + duration))
        {
            state = end;
        }
        copy(&mut attrs, "duration_seconds", last, "duration");
    }

    EntityState::new(DOMAIN, profile, "previous_sleep_end", Some("Previous sleep end"), state)
        .with_attributes(attrs)
}

/// `"1h 5m"` rendering of a duration in seconds
fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GrowthData;
    use crate::state::ChildState;

    fn child() -> ChildProfile {
        let mut profile = ChildProfile::new("child_1", "Test Child");
        profile.birthday = Some("2023-01-01".to_string());
        profile.gender = Some("boy".to_string());
        profile
    }

    fn snapshot_with(state: ChildState) -> RealtimeSnapshot {
        [("child_1".to_string(), state)].into_iter().collect()
    }

    fn with_doc(stream: StreamKind, document: Value) -> RealtimeSnapshot {
        let mut state = ChildState::new(Some(Arc::new(child())));
        let document = Some(Arc::new(document));
        match stream {
            StreamKind::Sleep => state.sleep_status = document,
            StreamKind::Feed => state.feed_status = document,
            StreamKind::Diaper => state.diaper_data = document,
            StreamKind::Health => unreachable!("health slices are stored extracted"),
        }
        snapshot_with(state)
    }

    #[test]
    fn test_children_sensor() {
        let profiles = vec![
            Arc::new(child()),
            Arc::new(ChildProfile::new("child_2", "Second Child")),
        ];
        let entity = children(&profiles);

        assert_eq!(entity.state, "2");
        assert_eq!(entity.attribute("child_ids"), Some(&json!(["child_1", "child_2"])));
        assert_eq!(
            entity.attribute("child_names"),
            Some(&json!(["Test Child", "Second Child"]))
        );
        assert_eq!(entity.attribute("children").unwrap()[0]["birthday"], json!("2023-01-01"));
        assert_eq!(entity.attribute("children").unwrap()[1]["birthday"], Value::Null);
    }

    #[test]
    fn test_profile_sensor_skips_unset_fields() {
        let entity = profile(&child());

        assert_eq!(entity.entity_id, "sensor.test_child");
        assert_eq!(entity.state, "Test Child");
        assert_eq!(entity.attribute("birthday"), Some(&json!("2023-01-01")));
        assert_eq!(entity.attribute("uid"), Some(&json!("child_1")));
        assert!(entity.attribute("picture").is_none());
    }

    #[test]
    fn test_growth_states() {
        let profile = child();
        assert_eq!(growth(&profile, &RealtimeSnapshot::new()).state, "No data");

        let mut state = ChildState::new(None);
        state.growth_data = Some(GrowthData::placeholder());
        let placeholder = growth(&profile, &snapshot_with(state.clone()));
        assert_eq!(placeholder.state, "Unknown");
        assert!(placeholder.attributes.is_empty());

        state.growth_data = Some(GrowthData {
            weight: Some(10.5),
            head: Some(45.0),
            timestamp: Some(1700000000.0),
            ..GrowthData::placeholder()
        });
        let measured = growth(&profile, &snapshot_with(state));
        assert_eq!(measured.state, "2023-11-14 22:13");
        assert_eq!(measured.attribute("weight"), Some(&json!(10.5)));
        assert_eq!(measured.attribute("weight_display"), Some(&json!("10.5 kg")));
        assert_eq!(measured.attribute("head_unit"), Some(&json!("hcm")));
        assert!(measured.attribute("height").is_none());
        assert_eq!(
            measured.attribute("last_measured"),
            Some(&json!("2023-11-14T22:13:20+00:00"))
        );
    }

    #[test]
    fn test_last_diaper() {
        let profile = child();
        let empty = with_doc(StreamKind::Diaper, json!({"prefs": {}}));
        assert_eq!(last_diaper(&profile, &empty).state, "No changes logged");

        let logged = with_doc(
            StreamKind::Diaper,
            json!({"prefs": {"lastDiaper": {"start": 1700000000, "mode": "both", "offset": -60}}}),
        );
        let entity = last_diaper(&profile, &logged);
        assert_eq!(entity.entity_id, "sensor.test_child_last_diaper");
        assert_eq!(entity.state, "2023-11-14 22:13");
        assert_eq!(entity.attribute("type"), Some(&json!("Both")));
        assert_eq!(entity.attribute("timezone_offset_minutes"), Some(&json!(-60)));
    }

    #[test]
    fn test_sleep_status_sleeping() {
        let snapshot = with_doc(
            StreamKind::Sleep,
            json!({"timer": {"active": true, "paused": false, "timerStartTime": 1700000000000i64}}),
        );
        let entity = sleep_status(&child(), &snapshot);

        assert_eq!(entity.state, "sleeping");
        assert_eq!(entity.attribute("timer_start_time_ms"), Some(&json!(1700000000000i64)));
        assert_eq!(entity.attribute("timer_start_time"), Some(&json!(1700000000)));
        assert_eq!(entity.attribute("is_paused"), Some(&json!(false)));
        assert!(entity.available);
    }

    #[test]
    fn test_sleep_status_paused_and_history() {
        let snapshot = with_doc(
            StreamKind::Sleep,
            json!({
                "timer": {"active": true, "paused": true, "timerStartTime": 1700000000000i64},
                "prefs": {"lastSleep": {"start": 1699990000, "duration": 5400}}
            }),
        );
        let entity = sleep_status(&child(), &snapshot);

        assert_eq!(entity.state, "paused");
        assert!(entity.attribute("timer_start_time").is_none());
        assert_eq!(entity.attribute("last_sleep_duration_seconds"), Some(&json!(5400)));
    }

    #[test]
    fn test_status_sensors_unavailable_without_child() {
        let entity = sleep_status(&child(), &RealtimeSnapshot::new());
        assert_eq!(entity.state, "none");
        assert!(!entity.available);
        assert!(!feeding_status(&child(), &RealtimeSnapshot::new()).available);
    }

    #[test]
    fn test_feeding_status_attributes() {
        let snapshot = with_doc(
            StreamKind::Feed,
            json!({
                "timer": {"active": true, "paused": false, "activeSide": "right", "leftDuration": 120},
                "prefs": {"lastNursing": {"start": 1699990000, "duration": 900, "leftDuration": 500}}
            }),
        );
        let entity = feeding_status(&child(), &snapshot);

        assert_eq!(entity.state, "feeding");
        assert_eq!(entity.attribute("last_side"), Some(&json!("right")));
        assert_eq!(entity.attribute("left_duration_seconds"), Some(&json!(120)));
        assert_eq!(entity.attribute("right_duration_seconds"), Some(&json!(0)));
        assert_eq!(entity.attribute("last_nursing_left_seconds"), Some(&json!(500)));
        assert_eq!(entity.attribute("last_nursing_right_seconds"), Some(&json!(0)));
    }

    #[test]
    fn test_history_sensors() {
        let profile = child();
        let feed = with_doc(
            StreamKind::Feed,
            json!({
                "timer": {"active": false},
                "prefs": {
                    "lastSide": {"lastSide": "left"},
                    "lastNursing": {"start": 1700000000, "duration": 600, "leftDuration": 300, "rightDuration": 300}
                }
            }),
        );
        assert_eq!(last_feeding_side(&profile, &feed).state, "Left");

        let previous = previous_feed_start(&profile, &feed);
        assert_eq!(previous.entity_id, "sensor.test_child_previous_feed_start");
        assert_eq!(previous.state, "2023-11-14T22:13:20+00:00");
        assert_eq!(previous.attribute("duration_seconds"), Some(&json!(600)));
        assert_eq!(previous.attribute("last_side"), Some(&json!("left")));

        let sleep = with_doc(
            StreamKind::Sleep,
            json!({"timer": {"active": false}, "prefs": {"lastSleep": {"start": 1700001000, "duration": 3600}}}),
        );
        let start = previous_sleep_start(&profile, &sleep);
        assert_eq!(start.state, "2023-11-14T22:30:00+00:00");
        assert_eq!(start.attribute("duration"), Some(&json!("1h 0m")));

        let end = previous_sleep_end(&profile, &sleep);
        assert_eq!(end.state, "2023-11-14T23:30:00+00:00");
        assert_eq!(end.attribute("duration_seconds"), Some(&json!(3600)));
    }

    #[test]
    fn test_last_feeding_side_unknown() {
        let snapshot = with_doc(StreamKind::Feed, json!({"timer": {"active": false}}));
        assert_eq!(last_feeding_side(&child(), &snapshot).state, "Unknown");
    }
}
