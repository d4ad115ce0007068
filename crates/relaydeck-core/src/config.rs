// ── Runtime sync configuration ──
//
// Tuning knobs for the sync engine. Core never reads config files: the
// TUI loads `relaydeck-config`, converts it into a `SyncConfig` plus a
// device list, and hands both to the `Controller`.

use std::time::Duration;

/// Timing and concurrency settings for cache fetches, wave loading,
/// polling, and the per-device circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Devices fetched together in one wave of the initial load.
    pub batch_size: usize,
    /// Pause between two waves of the initial load.
    pub wave_pause: Duration,
    /// Deadline for a single status fetch.
    pub fetch_timeout: Duration,
    /// Shared deadline for one `fetch_all` call.
    pub fetch_all_timeout: Duration,
    /// Upper bound on in-flight status requests during `fetch_all`.
    pub max_concurrent_fetches: usize,
    /// Interval of the background poll tick. Zero disables polling.
    pub poll_interval: Duration,
    /// Minimum spacing of manual refreshes of the same device.
    pub refresh_debounce: Duration,
    /// Consecutive failures before a device's circuit opens. 0 = never.
    pub breaker_failure_threshold: u32,
    /// How long an open circuit rejects polls.
    pub breaker_cooldown: Duration,
    /// Capacity of the in-memory event log.
    pub log_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            wave_pause: Duration::from_millis(250),
            fetch_timeout: Duration::from_secs(5),
            fetch_all_timeout: Duration::from_secs(10),
            max_concurrent_fetches: 10,
            poll_interval: Duration::from_secs(15),
            refresh_debounce: Duration::from_millis(1500),
            breaker_failure_threshold: 3,
            breaker_cooldown: Duration::from_secs(30),
            log_capacity: 100,
        }
    }
}
