// ── Wave loader ──
//
// Staged initial load: devices are split into fixed-size waves, each wave
// is fetched concurrently through the cache, and the next wave starts only
// after the current one has fully settled. Failures never abort the load;
// failed devices stay offline until the periodic poll picks them up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SyncEvent;
use super::log::EventLog;
use crate::model::DeviceKey;
use crate::store::DeviceCache;

/// Ordered partition of the device set into waves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavePlan {
    waves: Vec<Vec<DeviceKey>>,
}

impl WavePlan {
    /// `batch_size` below one is treated as one.
    pub fn new(keys: &[DeviceKey], batch_size: usize) -> Self {
        Self {
            waves: keys.chunks(batch_size.max(1)).map(<[_]>::to_vec).collect(),
        }
    }

    pub fn waves(&self) -> &[Vec<DeviceKey>] {
        &self.waves
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

/// Outcome of one [`WaveLoader::run`].
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub waves: usize,
    pub loaded: Vec<DeviceKey>,
    pub failed: Vec<DeviceKey>,
    /// `false` when cancelled before the last wave settled.
    pub complete: bool,
}

pub struct WaveLoader {
    cache: Arc<DeviceCache>,
    log: Arc<EventLog>,
    batch_size: usize,
    pause: Duration,
    running: AtomicBool,
    completed: AtomicBool,
    settled_waves: AtomicUsize,
    total_waves: AtomicUsize,
}

impl WaveLoader {
    pub fn new(
        cache: Arc<DeviceCache>,
        log: Arc<EventLog>,
        batch_size: usize,
        pause: Duration,
    ) -> Self {
        Self {
            cache,
            log,
            batch_size: batch_size.max(1),
            pause,
            running: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            settled_waves: AtomicUsize::new(0),
            total_waves: AtomicUsize::new(0),
        }
    }

    /// Whether `AllDevicesLoaded` has been emitted.
    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// `(settled, total)` waves of the current or last run.
    pub fn progress(&self) -> (usize, usize) {
        (
            self.settled_waves.load(Ordering::Relaxed),
            self.total_waves.load(Ordering::Relaxed),
        )
    }

    /// Load every device currently in the cache, wave by wave.
    ///
    /// Returns `None` if another run is already in progress. Completion is
    /// announced only by the first run that settles its last wave; later
    /// runs refresh the cache but stay silent.
    pub async fn run(
        &self,
        events: &mpsc::UnboundedSender<SyncEvent>,
        cancel: &CancellationToken,
    ) -> Option<LoadReport> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("wave load already running, ignoring second start");
            return None;
        }

        let report = {
            let _running = RunningGuard(&self.running);
            self.run_waves(events, cancel).await
        };

        if report.complete
            && self
                .completed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            let offline = report.failed.len();
            let online = report.loaded.len();
            info!(online, offline, waves = report.waves, "initial load complete");
            let _ = events.send(SyncEvent::AllDevicesLoaded { online, offline });
        }

        Some(report)
    }

    async fn run_waves(
        &self,
        events: &mpsc::UnboundedSender<SyncEvent>,
        cancel: &CancellationToken,
    ) -> LoadReport {
        let plan = WavePlan::new(&self.cache.keys(), self.batch_size);
        let waves = plan.len();
        self.total_waves.store(waves, Ordering::Relaxed);
        self.settled_waves.store(0, Ordering::Relaxed);

        let mut report = LoadReport {
            waves,
            ..LoadReport::default()
        };

        for (index, wave) in plan.waves().iter().enumerate() {
            if cancel.is_cancelled() {
                return report;
            }

            debug!(wave = index + 1, waves, devices = wave.len(), "starting wave");
            let _ = events.send(SyncEvent::WaveStarted {
                wave: index,
                waves,
                devices: wave.len(),
            });

            let fetches = self.cache.fetch_all(wave.clone()).collect::<Vec<_>>();
            let results = tokio::select! {
                biased;
                () = cancel.cancelled() => return report,
                results = fetches => results,
            };

            let mut failed = 0;
            for (key, result) in results {
                match result {
                    Ok(_) => report.loaded.push(key),
                    Err(e) => {
                        self.log.warn(&key, format!("initial fetch failed: {e}"));
                        report.failed.push(key);
                        failed += 1;
                    }
                }
            }

            self.settled_waves.store(index + 1, Ordering::Relaxed);
            let _ = events.send(SyncEvent::WaveSettled {
                wave: index,
                waves,
                failed,
            });

            if index + 1 < waves && !self.pause.is_zero() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return report,
                    () = tokio::time::sleep(self.pause) => {}
                }
            }
        }

        report.complete = true;
        report
    }
}

/// Clears the running flag even if the run future is dropped mid-wave.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
