//! Device-state synchronization engine between `relaydeck-api` and the TUI.
//!
//! - **[`Controller`]**: facade owning the transport, cache, event log and
//!   background tasks. [`start()`](Controller::start) runs the staged
//!   initial load and then opens push subscriptions;
//!   [`poll_tick()`](Controller::poll_tick) is the periodic fallback.
//!
//! - **[`DeviceCache`]**: versioned map of [`DeviceState`]s guarded by a
//!   single `watch` channel. Readers get immutable [`CacheSnapshot`]s.
//!
//! - **[`WaveLoader`]** and **[`SubscriptionManager`]**: staged bulk fetch
//!   and at-most-one push stream per device.
//!
//! - **Domain model** ([`model`]): [`Device`], [`DeviceKey`],
//!   [`DeviceState`] with per-component substates and aggregated
//!   [`Telemetry`].

pub mod config;
pub mod controller;
pub mod convert;
pub mod error;
pub mod model;
pub mod store;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::SyncConfig;
pub use controller::{Controller, PollReport};
pub use error::{CoreError, ErrorKind};
pub use store::{CacheSnapshot, DeviceCache, DeviceEntry};
pub use sync::{
    EventLog, LoadReport, LogEntry, LogLevel, SubscriptionManager, SyncEvent, WaveLoader,
    WavePlan,
};

pub use model::{
    Components, CoverState, Device, DeviceInfo, DeviceKey, DeviceState, LightState, Meter,
    SensorKind, SensorReading, SwitchState, Telemetry,
};

pub use relaydeck_api::{Generation, PushEvent};
