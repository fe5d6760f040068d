//! Realtime reconciliation coordinator
//!
//! The Coordinator is responsible for:
//! - Registering one listener per child per stream with the vendor service
//! - Merging pushed stream documents into the per-child cache
//! - Publishing a fresh snapshot to observers after every merge
//! - Running the low-frequency fallback refresh and session maintenance
//! - Deregistering every listener on shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ listener threads │─── StreamUpdate (child, stream, doc, seq) ───┐
//! └──────────────────┘                                              │
//!                                                          bounded mpsc
//!                                                                   ▼
//!  fallback tick ──┐                                    ┌───────────────────┐
//!  refresh request ┼──────────────────────────────────▶ │  delivery task    │
//!  shutdown ───────┘                                    │  (SnapshotCache)  │
//!                                                       └───────────────────┘
//!                                                                   │
//!                                                watch<Arc<RealtimeSnapshot>>
//!                                                                   ▼
//!                                                            observers
//! ```
//!
//! ## Ordering
//!
//! Callbacks enqueue updates with a global arrival sequence. A single
//! delivery task drains the channel in enqueue order, so two updates for the
//! same (child, stream) pair are applied in arrival order. Nothing is
//! promised across pairs.
//!
//! Callbacks never block and never lose the newest value. When the channel
//! is full, an update parks in a per-pair overflow slot that keeps only the
//! highest sequence; the cache ignores anything older than what it already
//! applied, so draining the slot late cannot bring back a stale document.
//!
//! ## Blocking calls
//!
//! Registration, session maintenance and listener teardown run on the
//! worker pool through [`run_blocking`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, Notify, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::executor::run_blocking;
use crate::model::{ChildProfile, StreamKind};
use crate::state::{RealtimeSnapshot, SnapshotCache};
use crate::traits::{StreamCallback, TrackerApi};

/// Events emitted by the Coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// Delivery loop started
    Started {
        children_count: usize,
    },

    /// A listener was registered
    ListenerRegistered {
        child_id: String,
        stream: StreamKind,
    },

    /// A listener registration failed (isolated to this child and stream)
    ListenerFailed {
        child_id: String,
        stream: StreamKind,
        error: String,
    },

    /// A stream update was merged and a snapshot published
    UpdateApplied {
        child_id: String,
        stream: StreamKind,
        sequence: u64,
    },

    /// The fallback refresh published a snapshot
    FallbackRefreshed {
        /// `true` when the seed snapshot was published
        seeded: bool,
    },

    /// Session maintenance failed (cached data kept)
    SessionMaintenanceFailed {
        error: String,
    },

    /// Delivery loop stopped
    Stopped {
        reason: String,
    },
}

/// A raw stream document on its way to the delivery task
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    pub child_id: String,
    pub stream: StreamKind,
    pub document: Value,
    /// Global arrival sequence, assigned at enqueue time
    pub sequence: u64,
}

/// Outcome of [`Coordinator::start_listening`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerReport {
    /// Number of listeners registered
    pub registered: usize,
    /// Child and stream of every failed registration
    pub failed: Vec<(String, StreamKind)>,
    /// `true` when listeners were already registered and nothing was done
    pub already_listening: bool,
}

/// Entry point from listener callbacks into the delivery task
///
/// Cheap to clone. Safe to call from any thread.
#[derive(Clone)]
struct UpdateSink {
    tx: mpsc::Sender<StreamUpdate>,
    sequence: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    /// Newest update per pair that did not fit in the channel
    overflow: Arc<StdMutex<HashMap<(String, StreamKind), StreamUpdate>>>,
    /// Wakes the delivery task when the overflow holds updates
    overflow_ready: Arc<Notify>,
}

impl UpdateSink {
    fn deliver(&self, child_id: &str, stream: StreamKind, document: Value) {
        if self.closed.load(Ordering::SeqCst) {
            debug!("Dropping {} update for {} after shutdown", stream, child_id);
            return;
        }

        let update = StreamUpdate {
            child_id: child_id.to_string(),
            stream,
            document,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
        };

        match self.tx.try_send(update) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(update)) => {
                debug!(
                    "Update channel full, parking {} update for {} (seq {})",
                    stream, child_id, update.sequence
                );
                self.park(update);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Delivery task gone, dropping {} update for {}", stream, child_id);
            }
        }
    }

    /// Keep `update` unless its pair already holds a newer one
    fn park(&self, update: StreamUpdate) {
        {
            let mut overflow = self.overflow.lock().unwrap_or_else(PoisonError::into_inner);
            match overflow.entry((update.child_id.clone(), update.stream)) {
                Entry::Occupied(mut slot) => {
                    if slot.get().sequence < update.sequence {
                        slot.insert(update);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(update);
                }
            }
        }
        self.overflow_ready.notify_one();
    }

    /// Parked updates in arrival order
    fn take_overflow(&self) -> Vec<StreamUpdate> {
        let mut updates: Vec<StreamUpdate> = self
            .overflow
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, update)| update)
            .collect();
        updates.sort_by_key(|update| update.sequence);
        updates
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Receivers owned by the delivery task once it runs
struct LoopChannels {
    updates: mpsc::Receiver<StreamUpdate>,
    refresh: mpsc::Receiver<()>,
}

/// Realtime reconciliation coordinator
///
/// ## Lifecycle
///
/// 1. Create with [`Coordinator::new()`]
/// 2. Register listeners with [`Coordinator::start_listening()`]
/// 3. Drive delivery with [`Coordinator::run()`] (usually on a spawned task,
///    with the coordinator behind an `Arc`)
/// 4. Stop with [`Coordinator::shutdown()`] or the shutdown signal
///
/// ## Observers
///
/// [`Coordinator::subscribe()`] returns a watch receiver that always holds the
/// latest published snapshot. Each snapshot is a fresh immutable container.
pub struct Coordinator {
    /// Vendor client
    api: Arc<dyn TrackerApi>,

    /// Children enumerated at setup
    children: Vec<Arc<ChildProfile>>,

    /// Fallback refresh interval
    fallback_interval: Duration,

    /// Callback entry point
    sink: UpdateSink,

    /// Taken by the delivery task when it starts
    loop_channels: Mutex<Option<LoopChannels>>,

    /// Published snapshots
    snapshot_tx: watch::Sender<Arc<RealtimeSnapshot>>,

    /// Refresh requests (capacity 1, extra requests coalesce)
    refresh_tx: mpsc::Sender<()>,

    /// Wakes the delivery task on shutdown
    stop: Notify,

    listening: AtomicBool,
    shut_down: AtomicBool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<CoordinatorEvent>,
}

impl Coordinator {
    /// Create a new coordinator
    ///
    /// # Parameters
    ///
    /// - `api`: Vendor client
    /// - `children`: Child profiles enumerated at setup
    /// - `config`: Coordinator settings
    ///
    /// # Returns
    ///
    /// A tuple of (coordinator, event_receiver) where event_receiver yields coordinator events
    pub fn new(
        api: Arc<dyn TrackerApi>,
        children: Vec<ChildProfile>,
        config: &CoordinatorConfig,
    ) -> Result<(Self, mpsc::Receiver<CoordinatorEvent>)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (update_tx, update_rx) = mpsc::channel(config.update_channel_capacity);
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (snapshot_tx, _) = watch::channel(Arc::new(RealtimeSnapshot::new()));

        let coordinator = Self {
            api,
            children: children.into_iter().map(Arc::new).collect(),
            fallback_interval: config.fallback_interval(),
            sink: UpdateSink {
                tx: update_tx,
                sequence: Arc::new(AtomicU64::new(0)),
                closed: Arc::new(AtomicBool::new(false)),
                overflow: Arc::new(StdMutex::new(HashMap::new())),
                overflow_ready: Arc::new(Notify::new()),
            },
            loop_channels: Mutex::new(Some(LoopChannels {
                updates: update_rx,
                refresh: refresh_rx,
            })),
            snapshot_tx,
            refresh_tx,
            stop: Notify::new(),
            listening: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            event_tx,
        };

        Ok((coordinator, event_rx))
    }

    /// Children enumerated at setup
    pub fn children(&self) -> &[Arc<ChildProfile>] {
        &self.children
    }

    /// Register one listener per child per stream
    ///
    /// Each registration runs on the worker pool. A failure is logged and
    /// isolated to its child and stream; the remaining registrations proceed.
    /// Calling this again after it ran is a no-op.
    pub async fn start_listening(&self) -> ListenerReport {
        if self.listening.swap(true, Ordering::SeqCst) {
            debug!("Listeners already registered, skipping");
            return ListenerReport {
                already_listening: true,
                ..ListenerReport::default()
            };
        }

        info!("Setting up realtime listeners for {} child(ren)", self.children.len());

        let mut report = ListenerReport::default();
        for child in &self.children {
            for stream in StreamKind::ALL {
                let child_id = child.uid.clone();
                let callback = self.listener_callback(&child_id, stream);

                let result = run_blocking(&self.api, move |api| {
                    api.register_listener(&child_id, stream, callback)
                })
                .await;

                match result {
                    Ok(()) => {
                        debug!("Registered {} listener for {}", stream, child.uid);
                        report.registered += 1;
                        self.emit_event(CoordinatorEvent::ListenerRegistered {
                            child_id: child.uid.clone(),
                            stream,
                        });
                    }
                    Err(e) => {
                        let err = Error::listener(child.uid.clone(), stream, e.to_string());
                        error!("{}", err);
                        report.failed.push((child.uid.clone(), stream));
                        self.emit_event(CoordinatorEvent::ListenerFailed {
                            child_id: child.uid.clone(),
                            stream,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            "Realtime listeners active: {} registered, {} failed",
            report.registered,
            report.failed.len()
        );
        report
    }

    /// Hand a raw stream document to the delivery task
    ///
    /// This is what every registered listener calls. Safe to call from any
    /// thread. Updates arriving after shutdown began are dropped.
    pub fn on_stream_update(&self, child_id: &str, stream: StreamKind, document: Value) {
        self.sink.deliver(child_id, stream, document);
    }

    /// Ask the delivery task to run a fallback refresh soon
    ///
    /// Requests made while one is already pending coalesce into it.
    pub fn request_refresh(&self) {
        match self.refresh_tx.try_send(()) {
            Ok(()) => debug!("Snapshot refresh requested"),
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Snapshot refresh already pending")
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("Delivery task gone, refresh request ignored")
            }
        }
    }

    /// Subscribe to published snapshots
    pub fn subscribe(&self) -> watch::Receiver<Arc<RealtimeSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Published snapshots as a stream (starts with the current one)
    pub fn updates(&self) -> WatchStream<Arc<RealtimeSnapshot>> {
        WatchStream::new(self.subscribe())
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<RealtimeSnapshot> {
        Arc::clone(&self.snapshot_tx.borrow())
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Run the delivery loop until Ctrl-C or [`Coordinator::shutdown()`]
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the delivery loop until `shutdown_rx` fires (or its sender is
    /// dropped) or [`Coordinator::shutdown()`] is called
    ///
    /// Without a receiver this behaves like [`Coordinator::run()`].
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let Some(mut channels) = self.loop_channels.lock().await.take() else {
            return Err(Error::Other("Coordinator delivery loop already ran".to_string()));
        };

        self.emit_event(CoordinatorEvent::Started {
            children_count: self.children.len(),
        });

        let shutdown_signal = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown_signal);

        let mut cache = SnapshotCache::new(self.children.clone());

        // First tick fires immediately and publishes the initial snapshot
        let mut ticker = tokio::time::interval(self.fallback_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            if self.is_shut_down() {
                break "Coordinator shut down";
            }

            tokio::select! {
                Some(update) = channels.updates.recv() => {
                    if self.is_shut_down() {
                        debug!("Dropping {} update for {} during shutdown", update.stream, update.child_id);
                        continue;
                    }
                    self.handle_update(&mut cache, update);
                }

                _ = self.sink.overflow_ready.notified() => {
                    for update in self.sink.take_overflow() {
                        if self.is_shut_down() {
                            break;
                        }
                        self.handle_update(&mut cache, update);
                    }
                }

                _ = ticker.tick() => {
                    self.refresh_fallback(&cache).await;
                }

                Some(()) = channels.refresh.recv() => {
                    self.refresh_fallback(&cache).await;
                }

                _ = self.stop.notified() => {
                    break "Coordinator shut down";
                }

                _ = &mut shutdown_signal => {
                    info!("Shutdown signal received");
                    break "Shutdown signal";
                }
            }
        };

        self.shutdown().await;
        self.emit_event(CoordinatorEvent::Stopped {
            reason: reason.to_string(),
        });
        info!("Coordinator stopped");

        Ok(())
    }

    /// Merge one update and publish the result
    fn handle_update(&self, cache: &mut SnapshotCache, update: StreamUpdate) {
        let StreamUpdate {
            child_id,
            stream,
            document,
            sequence,
        } = update;

        debug!("Applying {} update for {} (seq {})", stream, child_id, sequence);
        if cache.apply(&child_id, stream, document, sequence) {
            self.publish(cache.snapshot());
            self.emit_event(CoordinatorEvent::UpdateApplied {
                child_id,
                stream,
                sequence,
            });
        }
    }

    /// Fallback refresh
    ///
    /// Renews the session first (failure is logged and never clears cached
    /// data), then publishes the cache unchanged when it holds listener
    /// data, or the seed snapshot when it does not.
    async fn refresh_fallback(&self, cache: &SnapshotCache) {
        if let Err(e) = run_blocking(&self.api, |api| api.maintain_session()).await {
            error!("Failed to maintain session: {}", e);
            self.emit_event(CoordinatorEvent::SessionMaintenanceFailed {
                error: e.to_string(),
            });
        }

        let seeded = !cache.has_data();
        if seeded {
            debug!("No realtime data yet, publishing seed snapshot");
        }
        self.publish(cache.fallback_snapshot());
        self.emit_event(CoordinatorEvent::FallbackRefreshed { seeded });
    }

    fn publish(&self, snapshot: RealtimeSnapshot) {
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }

    /// Stop delivery and deregister every listener
    ///
    /// Safe to call more than once, before [`Coordinator::run()`], or after a
    /// partially failed [`Coordinator::start_listening()`]. Never fails:
    /// teardown errors are logged.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down coordinator");
        self.sink.close();
        self.stop.notify_one();

        if let Err(e) = run_blocking(&self.api, |api| api.stop_all_listeners()).await {
            error!("Failed to stop listeners: {}", e);
        }
    }

    /// Build the callback for one child's stream
    fn listener_callback(&self, child_id: &str, stream: StreamKind) -> StreamCallback {
        let sink = self.sink.clone();
        let child_id = child_id.to_string();
        Arc::new(move |document: Value| sink.deliver(&child_id, stream, document))
    }

    /// Emit a coordinator event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: CoordinatorEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
