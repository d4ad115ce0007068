// ── Controller facade ──
//
// Owns the transport, cache, event log, wave loader, and subscription
// manager, and exposes the operations the orchestrator needs. Fire-and-
// forget `request_*` methods spawn tracked tasks whose results come back
// as `SyncEvent`s; the async methods are the same operations for callers
// that want to await them directly.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relaydeck_api::Transport;

use crate::config::SyncConfig;
use crate::convert;
use crate::error::CoreError;
use crate::model::{Device, DeviceInfo, DeviceKey, DeviceState};
use crate::store::{CacheSnapshot, DeviceCache};
use crate::sync::{EventLog, SubscriptionManager, SyncEvent, WaveLoader};

/// Summary of one poll over every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub polled: usize,
    pub failed: usize,
    pub resubscribed: usize,
}

// ── Controller ───────────────────────────────────────────────────

/// Cheaply cloneable handle to the sync engine.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    cache: Arc<DeviceCache>,
    log: Arc<EventLog>,
    loader: WaveLoader,
    subscriptions: SubscriptionManager,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SyncEvent>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    subscriptions_started: AtomicBool,
    poll_in_flight: AtomicBool,
    last_manual_refresh: DashMap<DeviceKey, Instant>,
}

impl Controller {
    /// Build the engine. Nothing touches the network until [`start`](Self::start).
    pub fn new(devices: Vec<Device>, transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        let cache = Arc::new(DeviceCache::new(devices, Arc::clone(&transport), &config));
        let log = Arc::new(EventLog::new(config.log_capacity));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let loader = WaveLoader::new(
            Arc::clone(&cache),
            Arc::clone(&log),
            config.batch_size,
            config.wave_pause,
        );
        let subscriptions = SubscriptionManager::new(
            Arc::clone(&transport),
            Arc::clone(&cache),
            Arc::clone(&log),
            events_tx.clone(),
            cancel.child_token(),
        );

        Self {
            inner: Arc::new(ControllerInner {
                config,
                transport,
                cache,
                log,
                loader,
                subscriptions,
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                cancel,
                task_handles: Mutex::new(Vec::new()),
                subscriptions_started: AtomicBool::new(false),
                poll_in_flight: AtomicBool::new(false),
                last_manual_refresh: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<DeviceCache> {
        &self.inner.cache
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.inner.log
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.subscriptions
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.cache.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.inner.cache.version()
    }

    pub fn watch_cache(&self) -> watch::Receiver<CacheSnapshot> {
        self.inner.cache.subscribe()
    }

    /// Hand out the event receiver. Only the first call gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.inner
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether the initial wave load has completed.
    pub fn is_loaded(&self) -> bool {
        self.inner.loader.is_complete()
    }

    /// `(settled, total)` waves of the initial load.
    pub fn load_progress(&self) -> (usize, usize) {
        self.inner.loader.progress()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the initial wave load. Push subscriptions start once it completes.
    pub fn start(&self) {
        let controller = self.clone();
        self.spawn(async move {
            let report = controller
                .inner
                .loader
                .run(&controller.inner.events_tx, &controller.inner.cancel)
                .await;
            if report.is_some_and(|r| r.complete) {
                controller.start_subscriptions().await;
            }
        });
    }

    /// Subscribe every push-capable device. Runs once; later calls return 0.
    pub async fn start_subscriptions(&self) -> usize {
        if self.inner.subscriptions_started.swap(true, Ordering::AcqRel) {
            debug!("push subscriptions already started");
            return 0;
        }

        let mut started = 0;
        for key in self.inner.cache.keys() {
            if self.inner.subscriptions.subscribe(&key).await.is_some() {
                started += 1;
            }
        }
        info!(started, "push subscriptions started");
        started
    }

    /// Cancel every task and subscription and wait for them to exit.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.subscriptions.stop_all().await;

        let handles: Vec<JoinHandle<()>> = self
            .inner
            .task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
        debug!("controller shut down");
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let cancel = self.inner.cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = task => {}
            }
        });

        let mut handles = self
            .inner
            .task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    // ── Polling ──────────────────────────────────────────────────

    /// Periodic tick: poll every device and restart push subscriptions
    /// that have dropped. Skipped until the initial load has completed and
    /// while a previous poll is still running.
    pub async fn poll_tick(&self) -> Option<PollReport> {
        if !self.is_loaded() {
            debug!("initial load in progress, skipping poll");
            return None;
        }
        self.poll(true).await
    }

    /// Poll every device now, without touching subscriptions. Refused
    /// while the initial load is still working through its waves.
    pub async fn refresh_all(&self) -> Option<PollReport> {
        if !self.is_loaded() {
            debug!("initial load in progress, skipping refresh");
            return None;
        }
        self.poll(false).await
    }

    async fn poll(&self, resubscribe: bool) -> Option<PollReport> {
        if self.inner.poll_in_flight.swap(true, Ordering::AcqRel) {
            debug!("poll already in flight");
            return None;
        }

        let before = self.snapshot();
        let keys = self.inner.cache.keys();
        let results: Vec<_> = self.inner.cache.fetch_all(keys).collect().await;

        let mut report = PollReport {
            polled: results.len(),
            failed: 0,
            resubscribed: 0,
        };

        for (key, result) in results {
            let was_online = before.state(&key).is_some_and(|s| s.online);
            match result {
                Ok(_) => {
                    if !was_online && before.state(&key).is_some_and(DeviceState::has_data) {
                        self.inner.log.info(&key, "back online");
                    }
                    if resubscribe
                        && self.inner.subscriptions_started.load(Ordering::Acquire)
                        && !self.inner.subscriptions.is_live(&key)
                        && self.inner.subscriptions.subscribe(&key).await.is_some()
                    {
                        debug!(device = %key, "push subscription restarted");
                        report.resubscribed += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    if was_online {
                        self.inner.log.warn(&key, format!("went offline: {e}"));
                    }
                }
            }
        }

        self.inner.poll_in_flight.store(false, Ordering::Release);
        let _ = self.inner.events_tx.send(SyncEvent::PollFinished {
            version: self.version(),
            failed: report.failed,
        });
        Some(report)
    }

    /// Spawn [`poll_tick`](Self::poll_tick).
    pub fn request_poll(&self) {
        let controller = self.clone();
        self.spawn(async move {
            controller.poll_tick().await;
        });
    }

    /// Spawn [`refresh_all`](Self::refresh_all). Returns `false` without
    /// spawning while the initial load is running.
    pub fn request_refresh_all(&self) -> bool {
        if !self.is_loaded() {
            return false;
        }
        let controller = self.clone();
        self.spawn(async move {
            controller.refresh_all().await;
        });
        true
    }

    // ── Single-device operations ─────────────────────────────────

    /// Fetch one device now, bypassing an open circuit.
    pub async fn refresh(&self, key: &DeviceKey) -> Result<Arc<DeviceState>, CoreError> {
        self.inner.cache.force_fetch(key).await
    }

    /// Spawn a manual refresh unless one for the same device was requested
    /// within the debounce window. Returns `false` when debounced.
    pub fn request_refresh(&self, key: &DeviceKey) -> bool {
        if !self.debounce(key) {
            debug!(device = %key, "manual refresh debounced");
            return false;
        }

        let controller = self.clone();
        let key = key.clone();
        self.spawn(async move {
            let result = controller.refresh(&key).await.map(|_| ());
            if let Err(ref e) = result {
                controller.inner.log.warn(&key, format!("refresh failed: {e}"));
            }
            let _ = controller
                .inner
                .events_tx
                .send(SyncEvent::RefreshFinished { device: key, result });
        });
        true
    }

    fn debounce(&self, key: &DeviceKey) -> bool {
        let now = Instant::now();
        let window = self.inner.config.refresh_debounce;
        if let Some(last) = self.inner.last_manual_refresh.get(key) {
            if now.duration_since(*last) < window {
                return false;
            }
        }
        self.inner.last_manual_refresh.insert(key.clone(), now);
        true
    }

    /// Switch a relay channel, then refresh the device so the cache
    /// reflects what the device actually did.
    pub async fn set_switch(&self, key: &DeviceKey, channel: u8, on: bool) -> Result<(), CoreError> {
        let device = self
            .inner
            .cache
            .device(key)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: key.to_string(),
            })?;

        let timeout = self.inner.config.fetch_timeout;
        let outcome = tokio::time::timeout(
            timeout,
            self.inner
                .transport
                .set_switch(&device.address, device.generation, channel, on),
        )
        .await;

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CoreError::from(e)),
            Err(_) => Err(CoreError::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        };

        let state = if on { "on" } else { "off" };
        match &result {
            Ok(()) => {
                info!(device = %key, channel, on, "switch command sent");
                self.inner
                    .log
                    .info(key, format!("switch:{channel} set {state}"));
            }
            Err(e) => {
                warn!(device = %key, channel, error = %e, "switch command failed");
                self.inner
                    .log
                    .error(key, format!("switch:{channel} {state} failed: {e}"));
            }
        }

        if let Err(e) = self.refresh(key).await {
            debug!(device = %key, error = %e, "post-command refresh failed");
        }
        result
    }

    /// Spawn [`set_switch`](Self::set_switch).
    pub fn request_switch(&self, key: &DeviceKey, channel: u8, on: bool) {
        let controller = self.clone();
        let key = key.clone();
        self.spawn(async move {
            let result = controller.set_switch(&key, channel, on).await;
            let _ = controller.inner.events_tx.send(SyncEvent::CommandFinished {
                device: key,
                channel,
                on,
                result,
            });
        });
    }

    /// Read the configuration document and extract display metadata.
    pub async fn device_info(&self, key: &DeviceKey) -> Result<DeviceInfo, CoreError> {
        let device = self
            .inner
            .cache
            .device(key)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: key.to_string(),
            })?;

        let timeout = self.inner.config.fetch_timeout;
        let config = tokio::time::timeout(
            timeout,
            self.inner
                .transport
                .fetch_config(&device.address, device.generation),
        )
        .await
        .map_err(|_| CoreError::Timeout {
            timeout_secs: timeout.as_secs(),
        })??;

        Ok(convert::parse_device_info(device.generation, &config))
    }

    /// Spawn [`device_info`](Self::device_info).
    pub fn request_device_info(&self, key: &DeviceKey) {
        let controller = self.clone();
        let key = key.clone();
        self.spawn(async move {
            let result = controller.device_info(&key).await;
            let _ = controller
                .inner
                .events_tx
                .send(SyncEvent::DeviceInfoLoaded { device: key, result });
        });
    }

    /// Drop the device from the cache, then stop its subscription. A
    /// concurrent `subscribe` no longer finds the device once it is gone.
    pub async fn remove_device(&self, key: &DeviceKey) -> bool {
        let removed = self.inner.cache.remove_device(key);
        self.inner.subscriptions.unsubscribe(key).await;
        self.inner.last_manual_refresh.remove(key);
        if removed {
            info!(device = %key, "device removed");
        }
        removed
    }
}
