// ── Background synchronization ──
//
// Wave loading, push subscriptions, and their supporting pieces. Tasks
// here never touch UI state: they mutate the cache and report progress
// as `SyncEvent` messages on an unbounded channel.

pub mod breaker;
pub mod log;
pub mod subscription;
pub mod wave;

use crate::error::CoreError;
use crate::model::{DeviceInfo, DeviceKey};

pub use breaker::CircuitBreaker;
pub use log::{EventLog, LogEntry, LogLevel};
pub use subscription::SubscriptionManager;
pub use wave::{LoadReport, WaveLoader, WavePlan};

/// Progress and results posted by background tasks to the orchestrator.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A wave of the initial load started fetching.
    WaveStarted {
        wave: usize,
        waves: usize,
        devices: usize,
    },
    /// Every device of the wave answered or failed.
    WaveSettled {
        wave: usize,
        waves: usize,
        failed: usize,
    },
    /// The initial load finished. Sent at most once per controller.
    AllDevicesLoaded { online: usize, offline: usize },
    /// A push event changed a device.
    DeviceUpdated { device: DeviceKey, version: u64 },
    /// A background poll over all devices settled.
    PollFinished { version: u64, failed: usize },
    /// A manual refresh of one device settled.
    RefreshFinished {
        device: DeviceKey,
        result: Result<(), CoreError>,
    },
    /// A push subscription ended on its own (not cancelled).
    SubscriptionEnded { device: DeviceKey, reason: String },
    /// A relay command settled.
    CommandFinished {
        device: DeviceKey,
        channel: u8,
        on: bool,
        result: Result<(), CoreError>,
    },
    /// Configuration metadata requested for the detail view.
    DeviceInfoLoaded {
        device: DeviceKey,
        result: Result<DeviceInfo, CoreError>,
    },
}
