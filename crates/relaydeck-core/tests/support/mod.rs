// Scriptable in-memory transport shared by the core integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

use relaydeck_api::{Error, EventStream, Generation, PushEvent, Transport};
use relaydeck_core::{SyncConfig, SyncEvent};

/// Scripted answer to a status fetch.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(Value),
    /// Answer after a delay (paused-clock tests).
    Delayed(Duration, Value),
    /// HTTP 503, mapped to a transient connection failure.
    Refuse,
    /// Never answer.
    Hang,
}

/// Transport double counting push opens/closes and recording commands.
#[derive(Default)]
pub struct SpyTransport {
    replies: Mutex<HashMap<String, Reply>>,
    refuse_push: Mutex<HashSet<String>>,
    feeds: Mutex<HashMap<String, mpsc::UnboundedSender<PushEvent>>>,
    switches: Mutex<Vec<(String, u8, bool)>>,
    fetches: AtomicUsize,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// Counts a close when the stream (and with it this guard) is dropped.
struct CloseGuard(Arc<AtomicUsize>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SpyTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, address: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(address.to_owned(), reply);
    }

    pub fn refuse_push(&self, address: &str) {
        self.refuse_push.lock().unwrap().insert(address.to_owned());
    }

    /// Deliver an event on the device's open push stream.
    pub fn push(&self, address: &str, event: PushEvent) -> bool {
        self.feeds
            .lock()
            .unwrap()
            .get(address)
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// End the device's push stream as if the connection dropped.
    pub fn drop_push(&self, address: &str) {
        self.feeds.lock().unwrap().remove(address);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.opens() - self.closes()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn switch_calls(&self) -> Vec<(String, u8, bool)> {
        self.switches.lock().unwrap().clone()
    }
}

impl Transport for SpyTransport {
    fn fetch_status<'a>(
        &'a self,
        address: &'a str,
        _generation: Generation,
    ) -> BoxFuture<'a, Result<Value, Error>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or(Reply::Refuse);
        let in_flight = Arc::clone(&self.in_flight);
        let max_in_flight = Arc::clone(&self.max_in_flight);

        Box::pin(async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlightGuard(in_flight);

            match reply {
                Reply::Status(value) => Ok(value),
                Reply::Delayed(delay, value) => {
                    tokio::time::sleep(delay).await;
                    Ok(value)
                }
                Reply::Refuse => Err(Error::Http {
                    status: 503,
                    message: "refused".into(),
                }),
                Reply::Hang => std::future::pending().await,
            }
        })
    }

    fn fetch_config<'a>(
        &'a self,
        _address: &'a str,
        _generation: Generation,
    ) -> BoxFuture<'a, Result<Value, Error>> {
        Box::pin(async {
            Ok(serde_json::json!({
                "sys": { "device": { "name": "Spy", "mac": "000000000000" } }
            }))
        })
    }

    fn subscribe<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<EventStream, Error>> {
        Box::pin(async move {
            if self.refuse_push.lock().unwrap().contains(address) {
                return Err(Error::WebSocketConnect("refused".into()));
            }

            self.opens.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            self.feeds.lock().unwrap().insert(address.to_owned(), tx);

            let guard = CloseGuard(Arc::clone(&self.closes));
            let stream = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
                rx.recv().await.map(|event| (event, (rx, guard)))
            });
            Ok(Box::pin(stream) as EventStream)
        })
    }

    fn set_switch<'a>(
        &'a self,
        address: &'a str,
        _generation: Generation,
        channel: u8,
        on: bool,
    ) -> BoxFuture<'a, Result<(), Error>> {
        self.switches
            .lock()
            .unwrap()
            .push((address.to_owned(), channel, on));
        Box::pin(async { Ok(()) })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub fn plug_status(on: bool, power: f64) -> Value {
    serde_json::json!({
        "switch:0": {
            "id": 0, "output": on, "apower": power,
            "voltage": 230.0, "current": 0.65,
            "aenergy": { "total": 1000.0 }
        }
    })
}

pub fn fast_config() -> SyncConfig {
    SyncConfig {
        wave_pause: Duration::ZERO,
        fetch_timeout: Duration::from_millis(200),
        fetch_all_timeout: Duration::from_secs(1),
        refresh_debounce: Duration::from_secs(60),
        ..SyncConfig::default()
    }
}

/// Poll `cond` until it holds, failing the test after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Receive events until one matches, failing after five seconds.
pub async fn wait_for_event(
    rx: &mut mpsc::UnboundedReceiver<SyncEvent>,
    mut matches: impl FnMut(&SyncEvent) -> bool,
) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not received in time")
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
