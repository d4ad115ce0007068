#![allow(clippy::unwrap_used)]
// Behavioral tests for the cache, wave loader, subscription manager, and
// controller against a scripted in-memory transport.

mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relaydeck_core::{
    Controller, CoreError, Device, DeviceCache, DeviceKey, EventLog, Generation, LogLevel,
    PushEvent, SubscriptionManager, SyncConfig, SyncEvent, WaveLoader,
};
use support::{Reply, SpyTransport, drain, fast_config, plug_status, wait_for_event, wait_until};

// ── Helpers ─────────────────────────────────────────────────────────

fn gen2(name: &str) -> Device {
    Device::new(name, name, Generation::Gen2)
}

fn gen1(name: &str) -> Device {
    Device::new(name, name, Generation::Gen1)
}

fn key(name: &str) -> DeviceKey {
    DeviceKey::from(name)
}

fn cache_with(spy: &Arc<SpyTransport>, devices: Vec<Device>, config: &SyncConfig) -> Arc<DeviceCache> {
    Arc::new(DeviceCache::new(devices, spy.clone(), config))
}

struct Subs {
    manager: SubscriptionManager,
    cache: Arc<DeviceCache>,
    log: Arc<EventLog>,
    rx: mpsc::UnboundedReceiver<SyncEvent>,
}

fn subscriptions(spy: &Arc<SpyTransport>, devices: Vec<Device>) -> Subs {
    let cache = cache_with(spy, devices, &fast_config());
    let log = Arc::new(EventLog::new(100));
    let (tx, rx) = mpsc::unbounded_channel();
    let manager = SubscriptionManager::new(
        spy.clone(),
        Arc::clone(&cache),
        Arc::clone(&log),
        tx,
        CancellationToken::new(),
    );
    Subs {
        manager,
        cache,
        log,
        rx,
    }
}

// ── Cache ───────────────────────────────────────────────────────────

#[tokio::test]
async fn version_strictly_increases() {
    let spy = SpyTransport::new();
    spy.reply("kitchen", Reply::Status(plug_status(true, 150.0)));
    let cache = cache_with(&spy, vec![gen2("kitchen"), gen2("hall")], &fast_config());

    let mut versions = vec![cache.version()];
    cache.fetch_one(&key("kitchen")).await.unwrap();
    versions.push(cache.version());
    cache.fetch_one(&key("hall")).await.unwrap_err();
    versions.push(cache.version());
    cache.apply_push_event(
        &key("kitchen"),
        &PushEvent::StatusChange {
            component: "switch:0".into(),
            payload: json!({ "apower": 42.0 }),
        },
    );
    versions.push(cache.version());
    cache.fetch_one(&key("kitchen")).await.unwrap();
    versions.push(cache.version());

    assert!(
        versions.windows(2).all(|w| w[0] < w[1]),
        "versions not strictly increasing: {versions:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn offline_retains_last_known_telemetry() {
    let spy = SpyTransport::new();
    spy.reply("kitchen", Reply::Status(plug_status(true, 150.0)));
    let cache = cache_with(&spy, vec![gen2("kitchen")], &fast_config());
    cache.fetch_one(&key("kitchen")).await.unwrap();

    spy.reply("kitchen", Reply::Hang);
    let err = cache.fetch_one(&key("kitchen")).await.unwrap_err();
    assert!(matches!(err, CoreError::Timeout { .. }));

    let state = cache.state(&key("kitchen")).unwrap();
    assert!(!state.online);
    assert!(state.stale);
    assert!(state.last_error.is_some());
    assert_eq!(state.telemetry.power, Some(150.0));
}

#[tokio::test]
async fn status_change_merges_and_full_status_replaces() {
    let spy = SpyTransport::new();
    spy.reply("kitchen", Reply::Status(plug_status(true, 150.0)));
    let cache = cache_with(&spy, vec![gen2("kitchen")], &fast_config());
    cache.fetch_one(&key("kitchen")).await.unwrap();

    cache.apply_push_event(
        &key("kitchen"),
        &PushEvent::StatusChange {
            component: "switch:0".into(),
            payload: json!({ "apower": 42.0 }),
        },
    );
    let merged = cache.state(&key("kitchen")).unwrap();
    assert_eq!(merged.telemetry.power, Some(42.0));
    assert_eq!(merged.telemetry.voltage, Some(230.0));
    assert_eq!(merged.telemetry.current, Some(0.65));

    cache.apply_push_event(
        &key("kitchen"),
        &PushEvent::FullStatus {
            payload: json!({ "switch:0": { "output": false, "apower": 0.0, "voltage": 228.0 } }),
        },
    );
    let replaced = cache.state(&key("kitchen")).unwrap();
    assert_eq!(replaced.telemetry.power, Some(0.0));
    assert_eq!(replaced.telemetry.voltage, Some(228.0));
    assert_eq!(replaced.telemetry.current, None);
    assert_eq!(replaced.telemetry.energy, None);
}

#[tokio::test(start_paused = true)]
async fn fetch_all_respects_concurrency_cap() {
    let spy = SpyTransport::new();
    let names: Vec<String> = (0..6).map(|i| format!("dev-{i}")).collect();
    for name in &names {
        spy.reply(name, Reply::Delayed(Duration::from_millis(50), plug_status(true, 1.0)));
    }
    let config = SyncConfig {
        max_concurrent_fetches: 2,
        ..fast_config()
    };
    let cache = cache_with(&spy, names.iter().map(|n| gen2(n)).collect(), &config);

    use futures_util::StreamExt;
    let results: Vec<_> = cache.fetch_all(cache.keys()).collect().await;

    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(spy.max_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn fetch_all_deadline_marks_stragglers_offline() {
    let spy = SpyTransport::new();
    spy.reply("fast", Reply::Status(plug_status(true, 5.0)));
    spy.reply("stuck", Reply::Hang);
    let config = SyncConfig {
        fetch_timeout: Duration::from_secs(30),
        fetch_all_timeout: Duration::from_secs(1),
        ..fast_config()
    };
    let cache = cache_with(&spy, vec![gen2("fast"), gen2("stuck")], &config);

    use futures_util::StreamExt;
    let results: Vec<_> = cache.fetch_all(cache.keys()).collect().await;

    for (device, result) in results {
        if device == key("stuck") {
            assert!(matches!(result, Err(CoreError::Timeout { timeout_secs: 1 })));
        } else {
            assert!(result.is_ok());
        }
    }
    assert!(!cache.state(&key("stuck")).unwrap().online);
    assert!(cache.state(&key("fast")).unwrap().online);
}

#[tokio::test]
async fn open_circuit_short_circuits_polls_but_not_manual_refresh() {
    let spy = SpyTransport::new();
    let config = SyncConfig {
        breaker_failure_threshold: 2,
        ..fast_config()
    };
    let cache = cache_with(&spy, vec![gen2("flaky")], &config);

    cache.fetch_one(&key("flaky")).await.unwrap_err();
    cache.fetch_one(&key("flaky")).await.unwrap_err();
    assert_eq!(spy.fetches(), 2);

    let err = cache.fetch_one(&key("flaky")).await.unwrap_err();
    assert!(matches!(err, CoreError::CircuitOpen { .. }));
    assert_eq!(spy.fetches(), 2);

    spy.reply("flaky", Reply::Status(plug_status(false, 0.0)));
    cache.force_fetch(&key("flaky")).await.unwrap();
    assert_eq!(spy.fetches(), 3);
    assert!(!cache.breaker().is_open(&key("flaky")));
}

// ── Wave loader ─────────────────────────────────────────────────────

#[tokio::test]
async fn wave_completion_fires_once_regardless_of_failures() {
    let spy = SpyTransport::new();
    let devices: Vec<Device> = (0..7).map(|i| gen2(&format!("dev-{i}"))).collect();
    // Odd devices answer, even ones refuse.
    for i in (1..7).step_by(2) {
        spy.reply(&format!("dev-{i}"), Reply::Status(plug_status(true, 1.0)));
    }
    let cache = cache_with(&spy, devices, &fast_config());
    let log = Arc::new(EventLog::new(100));
    let loader = WaveLoader::new(Arc::clone(&cache), Arc::clone(&log), 3, Duration::ZERO);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let report = loader.run(&tx, &cancel).await.unwrap();
    assert!(report.complete);
    assert_eq!(report.waves, 3);
    assert_eq!(report.loaded.len(), 3);
    assert_eq!(report.failed.len(), 4);

    // A second run refreshes but never re-announces completion.
    loader.run(&tx, &cancel).await.unwrap();

    let events = drain(&mut rx);
    let settled = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::WaveSettled { .. }))
        .count();
    let loaded = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::AllDevicesLoaded { .. }))
        .count();
    assert_eq!(settled, 6);
    assert_eq!(loaded, 1);
    assert!(loader.is_complete());
    assert_eq!(loader.progress(), (3, 3));
    assert!(log.entries().iter().all(|e| e.level == LogLevel::Warn));
}

#[tokio::test]
async fn waves_settle_in_order() {
    let spy = SpyTransport::new();
    let devices: Vec<Device> = (0..4).map(|i| gen2(&format!("dev-{i}"))).collect();
    let cache = cache_with(&spy, devices, &fast_config());
    let loader = WaveLoader::new(cache, Arc::new(EventLog::new(10)), 2, Duration::ZERO);
    let (tx, mut rx) = mpsc::unbounded_channel();

    loader.run(&tx, &CancellationToken::new()).await.unwrap();

    let order: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::WaveStarted { wave, .. } => Some(format!("start {wave}")),
            SyncEvent::WaveSettled { wave, .. } => Some(format!("settle {wave}")),
            _ => None,
        })
        .collect();
    assert_eq!(order, ["start 0", "settle 0", "start 1", "settle 1"]);
}

#[tokio::test]
async fn empty_fleet_completes_immediately() {
    let spy = SpyTransport::new();
    let cache = cache_with(&spy, Vec::new(), &fast_config());
    let loader = WaveLoader::new(cache, Arc::new(EventLog::new(10)), 5, Duration::ZERO);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let report = loader.run(&tx, &CancellationToken::new()).await.unwrap();
    assert!(report.complete);
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [SyncEvent::AllDevicesLoaded {
            online: 0,
            offline: 0
        }]
    ));
}

#[tokio::test]
async fn cancelled_load_never_completes() {
    let spy = SpyTransport::new();
    let cache = cache_with(&spy, vec![gen2("a"), gen2("b")], &fast_config());
    let loader = WaveLoader::new(cache, Arc::new(EventLog::new(10)), 1, Duration::ZERO);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = loader.run(&tx, &cancel).await.unwrap();
    assert!(!report.complete);
    assert!(!loader.is_complete());
    assert!(drain(&mut rx).is_empty());
}

// ── Subscriptions ───────────────────────────────────────────────────

#[tokio::test]
async fn resubscribe_keeps_at_most_one_stream() {
    let spy = SpyTransport::new();
    let subs = subscriptions(&spy, vec![gen2("kitchen")]);

    subs.manager.subscribe(&key("kitchen")).await.unwrap();
    wait_until(|| spy.opens() == 1).await;

    subs.manager.subscribe(&key("kitchen")).await.unwrap();
    wait_until(|| spy.opens() == 2).await;

    assert_eq!(spy.closes(), 1);
    assert_eq!(spy.live_streams(), 1);
    assert_eq!(subs.manager.live_count(), 1);
}

#[tokio::test]
async fn devices_without_push_are_skipped() {
    let spy = SpyTransport::new();
    let subs = subscriptions(&spy, vec![gen1("garage"), gen2("kitchen").with_push(false)]);

    assert!(subs.manager.subscribe(&key("garage")).await.is_none());
    assert!(subs.manager.subscribe(&key("kitchen")).await.is_none());
    assert!(subs.manager.subscribe(&key("unknown")).await.is_none());
    assert_eq!(spy.opens(), 0);
}

#[tokio::test]
async fn push_events_update_cache_and_log() {
    let spy = SpyTransport::new();
    let mut subs = subscriptions(&spy, vec![gen2("kitchen")]);

    subs.manager.subscribe(&key("kitchen")).await.unwrap();
    wait_until(|| spy.opens() == 1).await;

    assert!(spy.push("kitchen", PushEvent::Online));
    assert!(spy.push(
        "kitchen",
        PushEvent::StatusChange {
            component: "switch:0".into(),
            payload: json!({ "output": true, "apower": 12.0 }),
        }
    ));

    wait_for_event(&mut subs.rx, |e| {
        matches!(e, SyncEvent::DeviceUpdated { version: 2, .. })
    })
    .await;

    let state = subs.cache.state(&key("kitchen")).unwrap();
    assert!(state.online);
    assert!(state.components.switches[&0].on);

    let messages: Vec<String> = subs.log.entries().into_iter().map(|e| e.message).collect();
    assert_eq!(messages, ["switch:0 turned on", "push connected"]);
}

#[tokio::test]
async fn disconnect_marks_offline_and_logs_error() {
    let spy = SpyTransport::new();
    spy.reply("kitchen", Reply::Status(plug_status(true, 150.0)));
    let mut subs = subscriptions(&spy, vec![gen2("kitchen")]);
    subs.cache.fetch_one(&key("kitchen")).await.unwrap();

    subs.manager.subscribe(&key("kitchen")).await.unwrap();
    wait_until(|| spy.opens() == 1).await;
    spy.drop_push("kitchen");

    let ended = wait_for_event(&mut subs.rx, |e| {
        matches!(e, SyncEvent::SubscriptionEnded { .. })
    })
    .await;
    assert!(matches!(ended, SyncEvent::SubscriptionEnded { device, .. } if device == key("kitchen")));

    let state = subs.cache.state(&key("kitchen")).unwrap();
    assert!(!state.online);
    assert_eq!(state.telemetry.power, Some(150.0));
    assert_eq!(subs.log.entries()[0].level, LogLevel::Error);

    wait_until(|| !subs.manager.is_live(&key("kitchen"))).await;
    assert_eq!(spy.live_streams(), 0);
}

#[tokio::test]
async fn refused_push_counts_as_disconnect() {
    let spy = SpyTransport::new();
    spy.refuse_push("kitchen");
    let mut subs = subscriptions(&spy, vec![gen2("kitchen")]);

    subs.manager.subscribe(&key("kitchen")).await.unwrap();
    wait_for_event(&mut subs.rx, |e| {
        matches!(e, SyncEvent::SubscriptionEnded { .. })
    })
    .await;
    assert_eq!(spy.opens(), 0);
}

#[tokio::test]
async fn stop_all_is_idempotent() {
    let spy = SpyTransport::new();
    let subs = subscriptions(&spy, vec![gen2("a"), gen2("b")]);

    subs.manager.subscribe(&key("a")).await.unwrap();
    subs.manager.subscribe(&key("b")).await.unwrap();
    wait_until(|| spy.opens() == 2).await;

    subs.manager.stop_all().await;
    subs.manager.stop_all().await;

    assert_eq!(spy.live_streams(), 0);
    assert_eq!(subs.manager.live_count(), 0);
    assert!(subs.manager.subscribe(&key("a")).await.is_none());
}

// ── Controller ──────────────────────────────────────────────────────

fn controller(spy: &Arc<SpyTransport>, devices: Vec<Device>) -> Controller {
    Controller::new(devices, spy.clone(), fast_config())
}

#[tokio::test]
async fn start_loads_then_subscribes_push_devices() {
    let spy = SpyTransport::new();
    spy.reply("kitchen", Reply::Status(plug_status(true, 10.0)));
    spy.reply("garage", Reply::Status(json!({ "relays": [{ "ison": false }] })));
    let controller = controller(&spy, vec![gen2("kitchen"), gen1("garage"), gen2("porch")]);
    let mut rx = controller.take_events().unwrap();
    assert!(controller.take_events().is_none());

    controller.start();
    let loaded = wait_for_event(&mut rx, |e| matches!(e, SyncEvent::AllDevicesLoaded { .. })).await;
    assert!(matches!(
        loaded,
        SyncEvent::AllDevicesLoaded {
            online: 2,
            offline: 1
        }
    ));

    // Both gen2 devices get a stream, the gen1 relay never does.
    wait_until(|| spy.opens() == 2).await;
    assert!(controller.is_loaded());

    controller.shutdown().await;
    assert_eq!(spy.live_streams(), 0);
}

#[tokio::test]
async fn poll_tick_waits_for_initial_load() {
    let spy = SpyTransport::new();
    let controller = controller(&spy, vec![gen2("kitchen")]);
    assert!(controller.poll_tick().await.is_none());
    assert_eq!(spy.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn refresh_all_is_refused_during_initial_load() {
    let spy = SpyTransport::new();
    let names: Vec<String> = (0..10).map(|i| format!("plug{i}")).collect();
    for name in &names {
        spy.reply(
            name,
            Reply::Delayed(Duration::from_millis(100), plug_status(true, 1.0)),
        );
    }
    let config = SyncConfig {
        batch_size: 2,
        ..fast_config()
    };
    let controller = Controller::new(names.iter().map(|n| gen2(n)).collect(), spy.clone(), config);
    let mut rx = controller.take_events().unwrap();

    controller.start();
    tokio::task::yield_now().await;
    assert!(!controller.is_loaded());

    assert!(controller.refresh_all().await.is_none());
    assert!(!controller.request_refresh_all());

    wait_for_event(&mut rx, |e| matches!(e, SyncEvent::AllDevicesLoaded { .. })).await;
    assert!(spy.max_in_flight() <= 2);
    assert_eq!(spy.fetches(), 10);

    let report = controller.refresh_all().await.unwrap();
    assert_eq!(report.polled, 10);
    assert_eq!(report.resubscribed, 0);

    controller.shutdown().await;
}

#[tokio::test]
async fn poll_tick_restarts_dropped_subscriptions() {
    let spy = SpyTransport::new();
    spy.reply("kitchen", Reply::Status(plug_status(true, 10.0)));
    let controller = controller(&spy, vec![gen2("kitchen")]);
    let mut rx = controller.take_events().unwrap();

    controller.start();
    wait_for_event(&mut rx, |e| matches!(e, SyncEvent::AllDevicesLoaded { .. })).await;
    wait_until(|| spy.opens() == 1).await;

    spy.drop_push("kitchen");
    wait_for_event(&mut rx, |e| matches!(e, SyncEvent::SubscriptionEnded { .. })).await;
    wait_until(|| !controller.subscriptions().is_live(&key("kitchen"))).await;

    let report = controller.poll_tick().await.unwrap();
    assert_eq!(report.polled, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.resubscribed, 1);
    wait_until(|| spy.opens() == 2).await;
    assert_eq!(spy.live_streams(), 1);

    controller.shutdown().await;
}

#[tokio::test]
async fn manual_refresh_is_debounced() {
    let spy = SpyTransport::new();
    spy.reply("kitchen", Reply::Status(plug_status(true, 10.0)));
    let controller = controller(&spy, vec![gen2("kitchen")]);
    let mut rx = controller.take_events().unwrap();

    assert!(controller.request_refresh(&key("kitchen")));
    assert!(!controller.request_refresh(&key("kitchen")));

    let finished = wait_for_event(&mut rx, |e| matches!(e, SyncEvent::RefreshFinished { .. })).await;
    assert!(matches!(finished, SyncEvent::RefreshFinished { result: Ok(()), .. }));
    assert_eq!(spy.fetches(), 1);
}

#[tokio::test]
async fn switch_command_is_sent_then_device_refreshed() {
    let spy = SpyTransport::new();
    spy.reply("kitchen", Reply::Status(plug_status(true, 10.0)));
    let controller = controller(&spy, vec![gen2("kitchen")]);

    controller.set_switch(&key("kitchen"), 0, true).await.unwrap();

    assert_eq!(spy.switch_calls(), vec![("kitchen".to_owned(), 0, true)]);
    assert_eq!(spy.fetches(), 1);
    assert_eq!(controller.log().entries()[0].message, "switch:0 set on");
}

#[tokio::test]
async fn device_info_comes_from_config() {
    let spy = SpyTransport::new();
    let controller = controller(&spy, vec![gen2("kitchen")]);
    let info = controller.device_info(&key("kitchen")).await.unwrap();
    assert_eq!(info.name.as_deref(), Some("Spy"));
}

#[tokio::test]
async fn remove_device_cancels_subscription_and_drops_entry() {
    let spy = SpyTransport::new();
    let controller = controller(&spy, vec![gen2("kitchen"), gen2("hall")]);
    controller.subscriptions().subscribe(&key("kitchen")).await.unwrap();
    wait_until(|| spy.opens() == 1).await;
    let version = controller.version();

    assert!(controller.remove_device(&key("kitchen")).await);
    assert!(!controller.remove_device(&key("kitchen")).await);

    assert_eq!(spy.live_streams(), 0);
    assert!(controller.version() > version);
    assert!(controller.snapshot().get(&key("kitchen")).is_none());
    assert_eq!(controller.snapshot().len(), 1);
}

#[tokio::test]
async fn remove_device_wins_over_concurrent_subscribe() {
    let spy = SpyTransport::new();
    let controller = controller(&spy, vec![gen2("kitchen")]);
    controller.subscriptions().subscribe(&key("kitchen")).await.unwrap();
    wait_until(|| spy.opens() == 1).await;

    let remove_key = key("kitchen");
    let subscribe_key = key("kitchen");
    let (removed, resubscribed) = tokio::join!(
        controller.remove_device(&remove_key),
        controller.subscriptions().subscribe(&subscribe_key),
    );

    assert!(removed);
    assert!(resubscribed.is_none());
    assert!(controller.snapshot().get(&key("kitchen")).is_none());
    assert_eq!(controller.subscriptions().live_count(), 0);
    assert_eq!(spy.live_streams(), 0);
}
