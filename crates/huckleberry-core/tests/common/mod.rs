//! Test doubles and common utilities for contract tests
//!
//! `MockTrackerApi` records every call, captures listener callbacks so a
//! test can fire them on demand, and injects failures per operation.

#![allow(dead_code)]

use huckleberry_core::config::{CoordinatorConfig, HuckleberryConfig};
use huckleberry_core::coordinator::{Coordinator, CoordinatorEvent};
use huckleberry_core::error::{Error, Result};
use huckleberry_core::model::{ChildProfile, DiaperEntry, FeedingSide, GrowthEntry, StreamKind};
use huckleberry_core::state::RealtimeSnapshot;
use huckleberry_core::traits::{StreamCallback, TrackerApi};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// A tracker client that records calls and hands listener control to tests
pub struct MockTrackerApi {
    children: Vec<ChildProfile>,

    /// Call counter for maintain_session()
    session_calls: Arc<AtomicUsize>,
    /// Call counter for stop_all_listeners()
    stop_calls: Arc<AtomicUsize>,
    /// Call counter for register_listener()
    register_calls: Arc<AtomicUsize>,
    /// Action calls by name, with the child they targeted
    actions: Arc<Mutex<Vec<(String, String)>>>,
    /// Recorded log_growth() calls
    growth_calls: Arc<Mutex<Vec<(String, GrowthEntry)>>>,

    /// Captured listener callbacks
    callbacks: Arc<Mutex<HashMap<(String, StreamKind), StreamCallback>>>,

    fail_auth: Arc<AtomicBool>,
    fail_session: Arc<AtomicBool>,
    fail_network: Arc<AtomicBool>,
    fail_register: Arc<Mutex<HashSet<(String, StreamKind)>>>,
}

impl MockTrackerApi {
    pub fn new(children: Vec<ChildProfile>) -> Self {
        Self {
            children,
            session_calls: Arc::new(AtomicUsize::new(0)),
            stop_calls: Arc::new(AtomicUsize::new(0)),
            register_calls: Arc::new(AtomicUsize::new(0)),
            actions: Arc::new(Mutex::new(Vec::new())),
            growth_calls: Arc::new(Mutex::new(Vec::new())),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            fail_auth: Arc::new(AtomicBool::new(false)),
            fail_session: Arc::new(AtomicBool::new(false)),
            fail_network: Arc::new(AtomicBool::new(false)),
            fail_register: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Mock with `count` children named `Child 1`..`Child N`
    pub fn with_children(count: usize) -> Self {
        Self::new(
            (1..=count)
                .map(|i| ChildProfile::new(format!("child_{}", i), format!("Child {}", i)))
                .collect(),
        )
    }

    /// Create a new mock that shares counters and callbacks with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            children: other.children.clone(),
            session_calls: Arc::clone(&other.session_calls),
            stop_calls: Arc::clone(&other.stop_calls),
            register_calls: Arc::clone(&other.register_calls),
            actions: Arc::clone(&other.actions),
            growth_calls: Arc::clone(&other.growth_calls),
            callbacks: Arc::clone(&other.callbacks),
            fail_auth: Arc::clone(&other.fail_auth),
            fail_session: Arc::clone(&other.fail_session),
            fail_network: Arc::clone(&other.fail_network),
            fail_register: Arc::clone(&other.fail_register),
        }
    }

    pub fn fail_auth(&self) {
        self.fail_auth.store(true, Ordering::SeqCst);
    }

    pub fn fail_session(&self) {
        self.fail_session.store(true, Ordering::SeqCst);
    }

    pub fn fail_network(&self) {
        self.fail_network.store(true, Ordering::SeqCst);
    }

    pub fn fail_register(&self, child_id: &str, stream: StreamKind) {
        self.fail_register
            .lock()
            .unwrap()
            .insert((child_id.to_string(), stream));
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn actions(&self) -> Vec<(String, String)> {
        self.actions.lock().unwrap().clone()
    }

    pub fn growth_calls(&self) -> Vec<(String, GrowthEntry)> {
        self.growth_calls.lock().unwrap().clone()
    }

    pub fn has_listener(&self, child_id: &str, stream: StreamKind) -> bool {
        self.callbacks
            .lock()
            .unwrap()
            .contains_key(&(child_id.to_string(), stream))
    }

    /// Captured listener callback of a pair
    pub fn callback(&self, child_id: &str, stream: StreamKind) -> Option<StreamCallback> {
        self.callbacks
            .lock()
            .unwrap()
            .get(&(child_id.to_string(), stream))
            .cloned()
    }

    /// Fire the captured listener of a pair, as the vendor would
    ///
    /// Returns false when no listener is registered for the pair.
    pub fn emit(&self, child_id: &str, stream: StreamKind, document: Value) -> bool {
        match self.callback(child_id, stream) {
            Some(callback) => {
                callback(document);
                true
            }
            None => false,
        }
    }

    fn record(&self, action: &str, child_id: &str) -> Result<()> {
        if self.fail_network.load(Ordering::SeqCst) {
            return Err(Error::network("connection reset"));
        }
        self.actions
            .lock()
            .unwrap()
            .push((action.to_string(), child_id.to_string()));
        Ok(())
    }
}

impl TrackerApi for MockTrackerApi {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    fn authenticate(&self) -> Result<()> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(Error::auth("invalid credentials"));
        }
        if self.fail_network.load(Ordering::SeqCst) {
            return Err(Error::network("connection refused"));
        }
        Ok(())
    }

    fn get_children(&self) -> Result<Vec<ChildProfile>> {
        Ok(self.children.clone())
    }

    fn register_listener(
        &self,
        child_id: &str,
        stream: StreamKind,
        callback: StreamCallback,
    ) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let pair = (child_id.to_string(), stream);
        if self.fail_register.lock().unwrap().contains(&pair) {
            return Err(Error::network("listener refused"));
        }
        self.callbacks.lock().unwrap().insert(pair, callback);
        Ok(())
    }

    fn maintain_session(&self) -> Result<()> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_session.load(Ordering::SeqCst) {
            return Err(Error::network("token refresh failed"));
        }
        Ok(())
    }

    fn stop_all_listeners(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().unwrap().clear();
        Ok(())
    }

    fn start_sleep(&self, child_id: &str) -> Result<()> {
        self.record("start_sleep", child_id)
    }

    fn pause_sleep(&self, child_id: &str) -> Result<()> {
        self.record("pause_sleep", child_id)
    }

    fn resume_sleep(&self, child_id: &str) -> Result<()> {
        self.record("resume_sleep", child_id)
    }

    fn cancel_sleep(&self, child_id: &str) -> Result<()> {
        self.record("cancel_sleep", child_id)
    }

    fn complete_sleep(&self, child_id: &str) -> Result<()> {
        self.record("complete_sleep", child_id)
    }

    fn start_feeding(&self, child_id: &str, side: FeedingSide) -> Result<()> {
        self.record(&format!("start_feeding:{}", side), child_id)
    }

    fn pause_feeding(&self, child_id: &str) -> Result<()> {
        self.record("pause_feeding", child_id)
    }

    fn resume_feeding(&self, child_id: &str, side: Option<FeedingSide>) -> Result<()> {
        match side {
            Some(side) => self.record(&format!("resume_feeding:{}", side), child_id),
            None => self.record("resume_feeding", child_id),
        }
    }

    fn switch_feeding_side(&self, child_id: &str) -> Result<()> {
        self.record("switch_feeding_side", child_id)
    }

    fn cancel_feeding(&self, child_id: &str) -> Result<()> {
        self.record("cancel_feeding", child_id)
    }

    fn complete_feeding(&self, child_id: &str) -> Result<()> {
        self.record("complete_feeding", child_id)
    }

    fn log_diaper(&self, child_id: &str, entry: &DiaperEntry) -> Result<()> {
        self.record(&format!("log_diaper:{}", entry.mode.as_str()), child_id)
    }

    fn log_growth(&self, child_id: &str, entry: &GrowthEntry) -> Result<()> {
        self.record("log_growth", child_id)?;
        self.growth_calls
            .lock()
            .unwrap()
            .push((child_id.to_string(), entry.clone()));
        Ok(())
    }
}

/// Coordinator settings with a fallback interval long enough to stay out of the way
pub fn quiet_config() -> CoordinatorConfig {
    CoordinatorConfig {
        fallback_interval_secs: 3600,
        ..CoordinatorConfig::default()
    }
}

pub fn minimal_config() -> HuckleberryConfig {
    HuckleberryConfig::new("parent@example.com", "secret").with_coordinator(quiet_config())
}

/// A coordinator over `api` whose loop is not running yet
pub fn build_coordinator(
    api: MockTrackerApi,
    config: &CoordinatorConfig,
) -> (Arc<Coordinator>, mpsc::Receiver<CoordinatorEvent>) {
    let children = api.get_children().unwrap();
    let (coordinator, events) = Coordinator::new(Arc::new(api), children, config)
        .expect("coordinator construction succeeds");
    (Arc::new(coordinator), events)
}

/// A coordinator over `api`, listening, with its loop running
pub struct RunningCoordinator {
    pub coordinator: Arc<Coordinator>,
    pub events: mpsc::Receiver<CoordinatorEvent>,
    pub snapshots: watch::Receiver<Arc<RealtimeSnapshot>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<Result<()>>>,
}

impl RunningCoordinator {
    pub async fn start(api: MockTrackerApi) -> Self {
        Self::start_with(api, quiet_config()).await
    }

    pub async fn start_with(api: MockTrackerApi, config: CoordinatorConfig) -> Self {
        let (coordinator, events) = build_coordinator(api, &config);
        Self::launch(coordinator, events).await
    }

    /// Register listeners and spawn the loop of an already built coordinator
    pub async fn launch(
        coordinator: Arc<Coordinator>,
        events: mpsc::Receiver<CoordinatorEvent>,
    ) -> Self {
        let snapshots = coordinator.subscribe();

        coordinator.start_listening().await;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run_with_shutdown(Some(shutdown_rx)).await })
        };

        Self {
            coordinator,
            events,
            snapshots,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for<F>(&mut self, predicate: F) -> Arc<RealtimeSnapshot>
    where
        F: Fn(&RealtimeSnapshot) -> bool,
    {
        let wait = async {
            loop {
                {
                    let current = self.snapshots.borrow_and_update();
                    if predicate(&**current) {
                        return Arc::clone(&*current);
                    }
                }
                self.snapshots
                    .changed()
                    .await
                    .expect("coordinator dropped the snapshot channel");
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("snapshot condition not met within 5 seconds")
    }

    /// Wait until the event channel yields an event matching `predicate`
    pub async fn wait_for_event<F>(&mut self, predicate: F) -> CoordinatorEvent
    where
        F: Fn(&CoordinatorEvent) -> bool,
    {
        let wait = async {
            loop {
                let event = self.events.recv().await.expect("event channel closed");
                if predicate(&event) {
                    return event;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("event not seen within 5 seconds")
    }

    /// Send the shutdown signal and wait for the loop to exit
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let handle = self.handle.take().expect("loop handle present");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("coordinator should stop within 5 seconds")
            .expect("coordinator task should not panic")
    }
}

/// Small pause to let the delivery task drain queued updates
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
