// # Memory Tracker Backend
//
// In-process implementation of TrackerApi.
//
// ## Purpose
//
// Holds child profiles and one raw document per (child, stream) pair, and
// behaves like the vendor service towards the bridge: listeners receive the
// current document on registration and every change after it, and actions
// rewrite the documents in the vendor's shapes.
//
// ## Seed File Format
//
// ```json
// {
//   "children": [{"uid": "child_1", "name": "Ada"}],
//   "documents": {
//     "child_1": {
//       "feed": {"timer": {"active": false}, "prefs": {"lastSide": {"lastSide": "left"}}}
//     }
//   }
// }
// ```
//
// ## When to Use
//
// - Tests and local development
// - Running the daemon without vendor credentials

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::fs;

use crate::config::{BackendConfig, HuckleberryConfig};
use crate::error::{Error, Result};
use crate::model::{ChildProfile, DiaperEntry, FeedingSide, GrowthEntry, StreamKind};
use crate::traits::{StreamCallback, TrackerApi, TrackerApiFactory};

type Pair = (String, StreamKind);

#[derive(Default)]
struct Inner {
    credentials: Option<(String, String)>,
    children: Vec<ChildProfile>,
    documents: HashMap<Pair, Value>,
    listeners: HashMap<Pair, Vec<StreamCallback>>,
    session_refreshes: usize,
}

/// Seed file contents
#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    children: Vec<ChildProfile>,
    #[serde(default)]
    documents: HashMap<String, HashMap<StreamKind, Value>>,
}

/// In-memory tracker backend
///
/// Clones share the same state, so a test can keep a handle to push
/// documents after handing the backend to the bridge.
///
/// # Example
///
/// ```rust,no_run
/// use huckleberry_core::backend::MemoryTrackerApi;
/// use huckleberry_core::model::{ChildProfile, StreamKind};
/// use serde_json::json;
///
/// let api = MemoryTrackerApi::with_children(vec![ChildProfile::new("child_1", "Ada")]);
/// api.push_document("child_1", StreamKind::Sleep, json!({"timer": {"active": false}}));
/// ```
#[derive(Clone, Default)]
pub struct MemoryTrackerApi {
    inner: Arc<Mutex<Inner>>,
    /// Held from reading a document until its listeners were notified, so
    /// writes to a pair reach listeners in the order they were stored
    writer: Arc<Mutex<()>>,
}

impl MemoryTrackerApi {
    /// Create an empty backend with no children
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend holding the given children
    pub fn with_children(children: Vec<ChildProfile>) -> Self {
        let api = Self::new();
        api.lock().children = children;
        api
    }

    /// Require these credentials in `authenticate`
    pub fn with_credentials(self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.lock().credentials = Some((email.into(), password.into()));
        self
    }

    /// Load children and documents from a JSON seed file
    pub async fn from_seed_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("Failed to read seed file {}: {}", path.display(), e))
        })?;
        let seed: SeedFile = serde_json::from_str(&content)?;

        let api = Self::with_children(seed.children);
        {
            let mut inner = api.lock();
            for (child_id, streams) in seed.documents {
                for (stream, document) in streams {
                    inner.documents.insert((child_id.clone(), stream), document);
                }
            }
            tracing::debug!(
                "Loaded seed file {}: {} children, {} documents",
                path.display(),
                inner.children.len(),
                inner.documents.len()
            );
        }
        Ok(api)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking callback must not take the backend down with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace a document and notify that pair's listeners
    pub fn push_document(&self, child_id: &str, stream: StreamKind, document: Value) {
        let _writer = self.write_lock();
        self.store_and_notify(child_id, stream, document);
    }

    /// Store a document and fan it out; the caller holds the writer lock
    fn store_and_notify(&self, child_id: &str, stream: StreamKind, document: Value) {
        let callbacks = {
            let mut inner = self.lock();
            let pair = (child_id.to_string(), stream);
            inner.documents.insert(pair.clone(), document.clone());
            inner.listeners.get(&pair).cloned().unwrap_or_default()
        };

        // Callbacks run outside the data lock: they may read the backend,
        // but must not write to it
        for callback in callbacks {
            callback(document.clone());
        }
    }

    /// Current document of a pair
    pub fn document(&self, child_id: &str, stream: StreamKind) -> Option<Value> {
        self.lock()
            .documents
            .get(&(child_id.to_string(), stream))
            .cloned()
    }

    /// Number of registered listener callbacks
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.values().map(Vec::len).sum()
    }

    /// Number of `maintain_session` calls so far
    pub fn session_refreshes(&self) -> usize {
        self.lock().session_refreshes
    }

    fn ensure_child(&self, child_id: &str) -> Result<()> {
        if self.lock().children.iter().any(|child| child.uid == child_id) {
            Ok(())
        } else {
            Err(Error::unknown_child(child_id))
        }
    }

    /// Apply `edit` to a child's document and push the result
    ///
    /// A missing document starts out as `{"timer": {}, "prefs": {}}`.
    fn update<F>(&self, child_id: &str, stream: StreamKind, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>, &mut Map<String, Value>) -> Result<()>,
    {
        self.ensure_child(child_id)?;

        let _writer = self.write_lock();
        let mut document = self
            .document(child_id, stream)
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        let root = document
            .as_object_mut()
            .ok_or_else(|| Error::Other("document is not an object".to_string()))?;

        let mut timer = take_object(root, "timer");
        let mut prefs = take_object(root, "prefs");
        edit(&mut timer, &mut prefs)?;
        root.insert("timer".to_string(), Value::Object(timer));
        root.insert("prefs".to_string(), Value::Object(prefs));

        self.store_and_notify(child_id, stream, document);
        Ok(())
    }
}

fn take_object(root: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match root.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn number(map: &Map<String, Value>, key: &str) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn flag(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn require_active(timer: &Map<String, Value>, what: &str) -> Result<()> {
    if flag(timer, "active") {
        Ok(())
    } else {
        Err(Error::invalid_input(format!("No {} in progress", what)))
    }
}

/// Fresh running timer
fn running_timer(now: f64) -> Map<String, Value> {
    let mut timer = Map::new();
    timer.insert("active".to_string(), json!(true));
    timer.insert("paused".to_string(), json!(false));
    timer.insert("timerStartTime".to_string(), json!((now * 1000.0) as i64));
    timer.insert("timestamp".to_string(), json!({"seconds": now}));
    timer.insert("lastUpdateTime".to_string(), json!(now));
    timer
}

fn idle_timer(timer: &mut Map<String, Value>) {
    timer.clear();
    timer.insert("active".to_string(), json!(false));
    timer.insert("paused".to_string(), json!(false));
}

/// Credit the time since the last update to the running side
fn accrue_side(timer: &mut Map<String, Value>, now: f64) {
    if flag(timer, "paused") {
        return;
    }
    let side = timer
        .get("activeSide")
        .and_then(Value::as_str)
        .and_then(FeedingSide::parse);
    if let Some(side) = side {
        let key = side_duration_key(side);
        let elapsed = (now - number(timer, "lastUpdateTime")).max(0.0);
        let total = number(timer, key) + elapsed;
        timer.insert(key.to_string(), json!(total));
    }
    timer.insert("lastUpdateTime".to_string(), json!(now));
}

fn side_duration_key(side: FeedingSide) -> &'static str {
    match side {
        FeedingSide::Left => "leftDuration",
        FeedingSide::Right => "rightDuration",
    }
}

impl TrackerApi for MemoryTrackerApi {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    fn authenticate(&self) -> Result<()> {
        let inner = self.lock();
        match &inner.credentials {
            Some((email, password)) if email.is_empty() || password.is_empty() => {
                Err(Error::auth("Missing credentials"))
            }
            _ => Ok(()),
        }
    }

    fn get_children(&self) -> Result<Vec<ChildProfile>> {
        Ok(self.lock().children.clone())
    }

    fn register_listener(
        &self,
        child_id: &str,
        stream: StreamKind,
        callback: StreamCallback,
    ) -> Result<()> {
        self.ensure_child(child_id)
            .map_err(|e| Error::listener(child_id, stream, e.to_string()))?;

        // The current document must reach the new listener before any later push
        let _writer = self.write_lock();
        let current = {
            let mut inner = self.lock();
            let pair = (child_id.to_string(), stream);
            inner
                .listeners
                .entry(pair.clone())
                .or_default()
                .push(callback.clone());
            inner.documents.get(&pair).cloned()
        };

        if let Some(document) = current {
            callback(document);
        }
        Ok(())
    }

    fn maintain_session(&self) -> Result<()> {
        self.lock().session_refreshes += 1;
        Ok(())
    }

    fn stop_all_listeners(&self) -> Result<()> {
        let mut inner = self.lock();
        let count: usize = inner.listeners.values().map(Vec::len).sum();
        inner.listeners.clear();
        tracing::debug!("Stopped {} listeners", count);
        Ok(())
    }

    fn start_sleep(&self, child_id: &str) -> Result<()> {
        self.update(child_id, StreamKind::Sleep, |timer, _| {
            *timer = running_timer(now_secs());
            Ok(())
        })
    }

    fn pause_sleep(&self, child_id: &str) -> Result<()> {
        self.update(child_id, StreamKind::Sleep, |timer, _| {
            require_active(timer, "sleep")?;
            timer.insert("paused".to_string(), json!(true));
            Ok(())
        })
    }

    fn resume_sleep(&self, child_id: &str) -> Result<()> {
        self.update(child_id, StreamKind::Sleep, |timer, _| {
            require_active(timer, "sleep")?;
            timer.insert("paused".to_string(), json!(false));
            Ok(())
        })
    }

    fn cancel_sleep(&self, child_id: &str) -> Result<()> {
        self.update(child_id, StreamKind::Sleep, |timer, _| {
            idle_timer(timer);
            Ok(())
        })
    }

    fn complete_sleep(&self, child_id: &str) -> Result<()> {
        self.update(child_id, StreamKind::Sleep, |timer, prefs| {
            require_active(timer, "sleep")?;
            let now = now_secs();
            let start = number(timer, "timerStartTime") / 1000.0;
            prefs.insert(
                "lastSleep".to_string(),
                json!({"start": start, "duration": (now - start).max(0.0).round()}),
            );
            idle_timer(timer);
            Ok(())
        })
    }

    fn start_feeding(&self, child_id: &str, side: FeedingSide) -> Result<()> {
        self.update(child_id, StreamKind::Feed, |timer, _| {
            *timer = running_timer(now_secs());
            timer.insert("activeSide".to_string(), json!(side.as_str()));
            timer.insert("lastSide".to_string(), json!("none"));
            timer.insert("leftDuration".to_string(), json!(0));
            timer.insert("rightDuration".to_string(), json!(0));
            Ok(())
        })
    }

    fn pause_feeding(&self, child_id: &str) -> Result<()> {
        self.update(child_id, StreamKind::Feed, |timer, _| {
            require_active(timer, "feeding")?;
            accrue_side(timer, now_secs());
            // The vendor drops activeSide while paused
            if let Some(side) = timer.remove("activeSide") {
                timer.insert("lastSide".to_string(), side);
            }
            timer.insert("paused".to_string(), json!(true));
            Ok(())
        })
    }

    fn resume_feeding(&self, child_id: &str, side: Option<FeedingSide>) -> Result<()> {
        self.update(child_id, StreamKind::Feed, |timer, _| {
            require_active(timer, "feeding")?;
            let side = side
                .or_else(|| {
                    timer
                        .get("lastSide")
                        .and_then(Value::as_str)
                        .and_then(FeedingSide::parse)
                })
                .unwrap_or_default();
            timer.insert("activeSide".to_string(), json!(side.as_str()));
            timer.insert("paused".to_string(), json!(false));
            timer.insert("lastUpdateTime".to_string(), json!(now_secs()));
            Ok(())
        })
    }

    fn switch_feeding_side(&self, child_id: &str) -> Result<()> {
        self.update(child_id, StreamKind::Feed, |timer, _| {
            require_active(timer, "feeding")?;
            accrue_side(timer, now_secs());
            let current = timer
                .get("activeSide")
                .or_else(|| timer.get("lastSide"))
                .and_then(Value::as_str)
                .and_then(FeedingSide::parse)
                .unwrap_or_default();
            timer.insert("lastSide".to_string(), json!(current.as_str()));
            timer.insert("activeSide".to_string(), json!(current.other().as_str()));
            Ok(())
        })
    }

    fn cancel_feeding(&self, child_id: &str) -> Result<()> {
        self.update(child_id, StreamKind::Feed, |timer, _| {
            idle_timer(timer);
            Ok(())
        })
    }

    fn complete_feeding(&self, child_id: &str) -> Result<()> {
        self.update(child_id, StreamKind::Feed, |timer, prefs| {
            require_active(timer, "feeding")?;
            accrue_side(timer, now_secs());
            let side = timer
                .get("activeSide")
                .or_else(|| timer.get("lastSide"))
                .and_then(Value::as_str)
                .and_then(FeedingSide::parse)
                .unwrap_or_default();
            let left = number(timer, "leftDuration").round();
            let right = number(timer, "rightDuration").round();
            prefs.insert(
                "lastNursing".to_string(),
                json!({
                    "start": number(timer, "timerStartTime") / 1000.0,
                    "duration": left + right,
                    "leftDuration": left,
                    "rightDuration": right,
                }),
            );
            prefs.insert("lastSide".to_string(), json!({"lastSide": side.as_str()}));
            idle_timer(timer);
            Ok(())
        })
    }

    fn log_diaper(&self, child_id: &str, entry: &DiaperEntry) -> Result<()> {
        let mut record = serde_json::to_value(entry)?;
        if let Some(record) = record.as_object_mut() {
            record.insert("start".to_string(), json!(now_secs()));
            record.insert("offset".to_string(), json!(0));
        }
        self.update(child_id, StreamKind::Diaper, |_, prefs| {
            prefs.insert("lastDiaper".to_string(), record);
            Ok(())
        })
    }

    fn log_growth(&self, child_id: &str, entry: &GrowthEntry) -> Result<()> {
        let (weight_units, height_units, head_units) = entry.units.unit_labels();
        let mut record = Map::new();
        for (key, value) in [("weight", entry.weight), ("height", entry.height), ("head", entry.head)] {
            if let Some(value) = value {
                record.insert(key.to_string(), json!(value));
            }
        }
        record.insert("weightUnits".to_string(), json!(weight_units));
        record.insert("heightUnits".to_string(), json!(height_units));
        record.insert("headUnits".to_string(), json!(head_units));
        record.insert("start".to_string(), json!(now_secs()));

        self.update(child_id, StreamKind::Health, |_, prefs| {
            prefs.insert("lastGrowthEntry".to_string(), Value::Object(record));
            Ok(())
        })
    }
}

/// Factory for the `memory` backend type
pub struct MemoryTrackerApiFactory;

#[async_trait]
impl TrackerApiFactory for MemoryTrackerApiFactory {
    async fn create(&self, config: &HuckleberryConfig) -> Result<Arc<dyn TrackerApi>> {
        let api = match &config.backend {
            BackendConfig::Memory { seed_file: Some(path) } => {
                MemoryTrackerApi::from_seed_file(path).await?
            }
            BackendConfig::Memory { seed_file: None } => MemoryTrackerApi::new(),
            other => {
                return Err(Error::config(format!(
                    "Memory factory cannot build a {} backend",
                    other.type_name()
                )));
            }
        };

        let account = &config.account;
        Ok(Arc::new(api.with_credentials(&account.email, &account.password)))
    }
}
