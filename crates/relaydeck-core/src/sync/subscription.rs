// ── Push subscription manager ──
//
// Holds at most one live push subscription per device. Each subscription
// is a spawned receive loop with its own cancellation token (a child of
// the manager's root token) that feeds push events into the cache and
// the event log. A loop that ends on its own marks the device offline
// and reports back; reconnecting is left to the orchestrator's next poll.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relaydeck_api::{PushEvent, Transport};

use super::SyncEvent;
use super::log::EventLog;
use crate::error::CoreError;
use crate::model::DeviceKey;
use crate::store::DeviceCache;

struct LiveSubscription {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LiveSubscription {
    /// Cancel and wait for the receive loop to drop its stream.
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!(error = %e, "subscription task panicked");
            }
        }
    }
}

pub struct SubscriptionManager {
    transport: Arc<dyn Transport>,
    cache: Arc<DeviceCache>,
    log: Arc<EventLog>,
    events: mpsc::UnboundedSender<SyncEvent>,
    live: Arc<DashMap<DeviceKey, LiveSubscription>>,
    next_id: AtomicU64,
    root: CancellationToken,
}

impl SubscriptionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<DeviceCache>,
        log: Arc<EventLog>,
        events: mpsc::UnboundedSender<SyncEvent>,
        root: CancellationToken,
    ) -> Self {
        Self {
            transport,
            cache,
            log,
            events,
            live: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            root,
        }
    }

    /// Start (or restart) the push subscription of `key`.
    ///
    /// Any existing subscription for the device is cancelled and awaited
    /// first. Returns the new subscription's cancel handle, or `None` for
    /// unknown devices, devices without push, and after [`stop_all`](Self::stop_all).
    pub async fn subscribe(&self, key: &DeviceKey) -> Option<CancellationToken> {
        let device = self.cache.device(key)?;
        if !device.supports_push() {
            debug!(device = %key, "push not supported, skipping subscription");
            return None;
        }

        if let Some((_, previous)) = self.live.remove(key) {
            debug!(device = %key, "replacing live subscription");
            previous.shutdown().await;
        }

        // The device may have been removed while the old loop shut down.
        if self.root.is_cancelled() || self.cache.device(key).is_none() {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();
        let task = ReceiveLoop {
            id,
            key: key.clone(),
            address: device.address.clone(),
            transport: Arc::clone(&self.transport),
            cache: Arc::clone(&self.cache),
            log: Arc::clone(&self.log),
            events: self.events.clone(),
            live: Arc::clone(&self.live),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        let displaced = self.live.insert(
            key.clone(),
            LiveSubscription {
                id,
                cancel: cancel.clone(),
                handle,
            },
        );
        // Two callers raced on the same key; the last one wins.
        if let Some(displaced) = displaced {
            displaced.shutdown().await;
        }

        if self.cache.device(key).is_none() {
            debug!(device = %key, "device removed during subscribe");
            self.unsubscribe(key).await;
            return None;
        }

        Some(cancel)
    }

    /// Cancel the subscription of `key`, if any. Returns `true` if one existed.
    pub async fn unsubscribe(&self, key: &DeviceKey) -> bool {
        match self.live.remove(key) {
            Some((_, sub)) => {
                sub.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Whether `key` has a receive loop that is still running.
    pub fn is_live(&self, key: &DeviceKey) -> bool {
        self.live.get(key).is_some_and(|s| !s.handle.is_finished())
    }

    pub fn live_count(&self) -> usize {
        self.live.iter().filter(|s| !s.handle.is_finished()).count()
    }

    /// Cancel every subscription and wait for all receive loops to exit.
    /// Safe to call repeatedly; later calls find nothing to stop.
    pub async fn stop_all(&self) {
        self.root.cancel();

        let keys: Vec<DeviceKey> = self.live.iter().map(|e| e.key().clone()).collect();
        let mut stopped = 0usize;
        for key in keys {
            if let Some((_, sub)) = self.live.remove(&key) {
                sub.shutdown().await;
                stopped += 1;
            }
        }

        if stopped > 0 {
            info!(stopped, "push subscriptions stopped");
        }
    }
}

// ── Receive loop ─────────────────────────────────────────────────────

enum Ending {
    Cancelled,
    Disconnected(String),
}

struct ReceiveLoop {
    id: u64,
    key: DeviceKey,
    address: String,
    transport: Arc<dyn Transport>,
    cache: Arc<DeviceCache>,
    log: Arc<EventLog>,
    events: mpsc::UnboundedSender<SyncEvent>,
    live: Arc<DashMap<DeviceKey, LiveSubscription>>,
    cancel: CancellationToken,
}

impl ReceiveLoop {
    async fn run(self) {
        let ending = self.receive().await;

        if let Ending::Disconnected(reason) = ending {
            warn!(device = %self.key, reason = %reason, "push subscription ended");
            let err = CoreError::Disconnected {
                reason: reason.clone(),
            };
            self.cache.mark_offline(&self.key, &err);
            self.log
                .error(&self.key, format!("push disconnected: {reason}"));
            let _ = self.events.send(SyncEvent::SubscriptionEnded {
                device: self.key.clone(),
                reason,
            });
        } else {
            debug!(device = %self.key, "push subscription cancelled");
        }

        // Only remove our own entry; a replacement may already be registered.
        self.live.remove_if(&self.key, |_, sub| sub.id == self.id);
    }

    async fn receive(&self) -> Ending {
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ending::Cancelled,
            result = self.transport.subscribe(&self.address) => result,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return Ending::Disconnected(CoreError::from(e).to_string()),
        };

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ending::Cancelled,
                item = stream.next() => match item {
                    Some(PushEvent::Offline { reason }) => return Ending::Disconnected(reason),
                    Some(event) => self.apply(&event),
                    None => return Ending::Disconnected("stream ended".into()),
                },
            }
        }
    }

    fn apply(&self, event: &PushEvent) {
        match event {
            PushEvent::Online => {
                self.log.info(&self.key, "push connected");
            }
            PushEvent::StatusChange { component, payload } => {
                if let Some(on) = payload.get("output").and_then(serde_json::Value::as_bool) {
                    let state = if on { "on" } else { "off" };
                    self.log.info(&self.key, format!("{component} turned {state}"));
                }
            }
            PushEvent::FullStatus { .. } | PushEvent::Offline { .. } => {}
        }

        if let Some(version) = self.cache.apply_push_event(&self.key, event) {
            let _ = self.events.send(SyncEvent::DeviceUpdated {
                device: self.key.clone(),
                version,
            });
        }
    }
}
