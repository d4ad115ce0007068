// ── Versioned device cache ──
//
// The single source of truth for device state. The map and its version
// counter live together inside one `watch` channel, so the channel's lock
// is the only lock: every mutation happens in `send_if_modified`, bumps the
// version exactly once, and publishes a new immutable snapshot. Network
// I/O and document parsing always happen before that lock is taken.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, Stream, StreamExt};
use indexmap::IndexMap;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use relaydeck_api::{PushEvent, Transport};

use crate::config::SyncConfig;
use crate::convert;
use crate::error::CoreError;
use crate::model::{Device, DeviceKey, DeviceState};
use crate::sync::breaker::CircuitBreaker;

/// One device and its current state. Both halves are shared, so cloning
/// an entry (or a whole snapshot) never copies device data.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub device: Arc<Device>,
    pub state: Arc<DeviceState>,
}

/// Immutable view of the cache at one version.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    version: u64,
    devices: Arc<IndexMap<DeviceKey, DeviceEntry>>,
}

impl CacheSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&DeviceEntry> {
        self.devices.get(key)
    }

    pub fn state(&self, key: &DeviceKey) -> Option<&DeviceState> {
        self.devices.get(key).map(|e| e.state.as_ref())
    }

    /// Entries in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceKey, &DeviceEntry)> {
        self.devices.iter()
    }

    pub fn get_index(&self, index: usize) -> Option<(&DeviceKey, &DeviceEntry)> {
        self.devices.get_index(index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.devices.values().filter(|e| e.state.online).count()
    }
}

/// Result of one device fetch inside [`DeviceCache::fetch_all`].
pub type FetchOutcome = (DeviceKey, Result<Arc<DeviceState>, CoreError>);

pub struct DeviceCache {
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker,
    fetch_timeout: Duration,
    fetch_all_timeout: Duration,
    max_concurrent_fetches: usize,
    inner: watch::Sender<CacheSnapshot>,
}

impl DeviceCache {
    /// One entry per device, all initially offline with no data.
    pub fn new(
        devices: impl IntoIterator<Item = Device>,
        transport: Arc<dyn Transport>,
        config: &SyncConfig,
    ) -> Self {
        let devices: IndexMap<DeviceKey, DeviceEntry> = devices
            .into_iter()
            .map(|device| {
                (
                    device.key.clone(),
                    DeviceEntry {
                        device: Arc::new(device),
                        state: Arc::new(DeviceState::default()),
                    },
                )
            })
            .collect();

        let (inner, _) = watch::channel(CacheSnapshot {
            version: 0,
            devices: Arc::new(devices),
        });

        Self {
            transport,
            breaker: CircuitBreaker::new(
                config.breaker_failure_threshold,
                config.breaker_cooldown,
            ),
            fetch_timeout: config.fetch_timeout,
            fetch_all_timeout: config.fetch_all_timeout,
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            inner,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CacheSnapshot> {
        self.inner.subscribe()
    }

    pub fn device(&self, key: &DeviceKey) -> Option<Arc<Device>> {
        self.inner
            .borrow()
            .devices
            .get(key)
            .map(|e| Arc::clone(&e.device))
    }

    pub fn state(&self, key: &DeviceKey) -> Option<Arc<DeviceState>> {
        self.inner
            .borrow()
            .devices
            .get(key)
            .map(|e| Arc::clone(&e.state))
    }

    /// Keys in configuration order.
    pub fn keys(&self) -> Vec<DeviceKey> {
        self.inner.borrow().devices.keys().cloned().collect()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    // ── Membership ───────────────────────────────────────────────────

    /// Returns `false` if a device with the same key already exists.
    pub fn insert_device(&self, device: Device) -> bool {
        self.inner.send_if_modified(|snap| {
            if snap.devices.contains_key(&device.key) {
                return false;
            }
            Arc::make_mut(&mut snap.devices).insert(
                device.key.clone(),
                DeviceEntry {
                    device: Arc::new(device),
                    state: Arc::new(DeviceState::default()),
                },
            );
            snap.version += 1;
            true
        })
    }

    /// Returns `false` if the key was unknown.
    pub fn remove_device(&self, key: &DeviceKey) -> bool {
        let removed = self.inner.send_if_modified(|snap| {
            if !snap.devices.contains_key(key) {
                return false;
            }
            Arc::make_mut(&mut snap.devices).shift_remove(key);
            snap.version += 1;
            true
        });
        if removed {
            self.breaker.forget(key);
        }
        removed
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Run `f` on a copy of the device's state and publish it if `f`
    /// reports a change. Returns the new version and state.
    fn update<F>(&self, key: &DeviceKey, f: F) -> Option<(u64, Arc<DeviceState>)>
    where
        F: FnOnce(&mut DeviceState) -> bool,
    {
        let mut published = None;
        self.inner.send_if_modified(|snap| {
            let Some(entry) = snap.devices.get(key) else {
                return false;
            };
            let mut next = DeviceState::clone(&entry.state);
            if !f(&mut next) {
                return false;
            }
            let next = Arc::new(next);
            if let Some(entry) = Arc::make_mut(&mut snap.devices).get_mut(key) {
                entry.state = Arc::clone(&next);
            }
            snap.version += 1;
            published = Some((snap.version, next));
            true
        });
        published
    }

    /// Flag the device offline, keeping its last readings. Returns the new
    /// version if the state changed.
    pub fn mark_offline(&self, key: &DeviceKey, error: &CoreError) -> Option<u64> {
        self.update(key, |state| state.mark_offline(error.to_string()))
            .map(|(version, _)| version)
    }

    /// Apply one push notification. Returns the new version, or `None`
    /// when the event changed nothing (unknown device, untracked component,
    /// redundant `Online`).
    pub fn apply_push_event(&self, key: &DeviceKey, event: &PushEvent) -> Option<u64> {
        let generation = self.device(key)?.generation;

        let applied = match event {
            PushEvent::FullStatus { payload } => {
                let components = convert::parse_status(generation, payload);
                let at = Utc::now();
                self.update(key, move |state| {
                    state.install(components, at);
                    true
                })
            }
            PushEvent::StatusChange { component, payload } => {
                self.update(key, |state| state.apply_component_change(component, payload))
            }
            PushEvent::Online => self.update(key, DeviceState::mark_online),
            PushEvent::Offline { reason } => {
                self.update(key, |state| state.mark_offline(reason.as_str()))
            }
        };

        if applied.is_some() && !matches!(event, PushEvent::Offline { .. }) {
            self.breaker.record_success(key);
        }
        applied.map(|(version, _)| version)
    }

    // ── Fetching ─────────────────────────────────────────────────────

    /// Poll one device, honoring its circuit breaker.
    pub async fn fetch_one(&self, key: &DeviceKey) -> Result<Arc<DeviceState>, CoreError> {
        self.fetch(key, true).await
    }

    /// Poll one device even if its circuit is open.
    pub async fn force_fetch(&self, key: &DeviceKey) -> Result<Arc<DeviceState>, CoreError> {
        self.fetch(key, false).await
    }

    async fn fetch(
        &self,
        key: &DeviceKey,
        honor_breaker: bool,
    ) -> Result<Arc<DeviceState>, CoreError> {
        let device = self.device(key).ok_or_else(|| CoreError::DeviceNotFound {
            identifier: key.to_string(),
        })?;

        if honor_breaker {
            self.breaker.check(key)?;
        }

        let outcome = tokio::time::timeout(
            self.fetch_timeout,
            self.transport
                .fetch_status(&device.address, device.generation),
        )
        .await;

        let status = match outcome {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(CoreError::from(e)),
            Err(_) => Err(CoreError::Timeout {
                timeout_secs: self.fetch_timeout.as_secs(),
            }),
        };

        match status {
            Ok(status) => {
                self.breaker.record_success(key);
                let components = convert::parse_status(device.generation, &status);
                let at = Utc::now();
                self.update(key, move |state| {
                    state.install(components, at);
                    true
                })
                .map(|(_, state)| state)
                .ok_or_else(|| CoreError::DeviceNotFound {
                    identifier: key.to_string(),
                })
            }
            Err(err) => {
                debug!(device = %key, error = %err, "status fetch failed");
                self.breaker.record_failure(key);
                self.mark_offline(key, &err);
                Err(err)
            }
        }
    }

    /// Poll many devices concurrently, yielding each result as it settles.
    ///
    /// At most `max_concurrent_fetches` requests are in flight. The whole
    /// batch shares one deadline, measured from this call; devices still
    /// pending when it passes are marked offline with a timeout.
    pub fn fetch_all(&self, keys: Vec<DeviceKey>) -> impl Stream<Item = FetchOutcome> + '_ {
        let deadline = Instant::now() + self.fetch_all_timeout;

        stream::iter(keys)
            .map(move |key| async move {
                let result = match tokio::time::timeout_at(deadline, self.fetch_one(&key)).await {
                    Ok(result) => result,
                    Err(_) => {
                        let err = CoreError::Timeout {
                            timeout_secs: self.fetch_all_timeout.as_secs(),
                        };
                        self.mark_offline(&key, &err);
                        Err(err)
                    }
                };
                (key, result)
            })
            .buffer_unordered(self.max_concurrent_fetches)
    }
}
