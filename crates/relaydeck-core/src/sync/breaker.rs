// ── Per-device circuit breaker ──
//
// Stops background polls from hammering a device that keeps failing.
// After `threshold` consecutive failures the circuit opens for
// `cooldown`; the first check after the cooldown lets one probe through
// (half-open) and turns every other caller away until its outcome closes
// or re-opens the circuit. A probe that never reports back (dropped by a
// fetch deadline) gives up its slot after another cooldown.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::DeviceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { since: Instant },
}

pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    states: DashMap<DeviceKey, BreakerState>,
}

impl CircuitBreaker {
    /// A `threshold` of zero disables the breaker entirely.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            states: DashMap::new(),
        }
    }

    /// `Err(CircuitOpen)` while the device is cooling down.
    pub fn check(&self, key: &DeviceKey) -> Result<(), CoreError> {
        let Some(mut state) = self.states.get_mut(key) else {
            return Ok(());
        };

        match *state {
            BreakerState::Open { until } => {
                let now = Instant::now();
                if now < until {
                    return Err(CoreError::CircuitOpen {
                        device: key.to_string(),
                        retry_in_secs: until.duration_since(now).as_secs().max(1),
                    });
                }
                debug!(device = %key, "circuit half-open, allowing probe");
                *state = BreakerState::HalfOpen { since: now };
                Ok(())
            }
            BreakerState::HalfOpen { since } => {
                let now = Instant::now();
                let lease_end = since + self.cooldown;
                if now < lease_end {
                    return Err(CoreError::CircuitOpen {
                        device: key.to_string(),
                        retry_in_secs: lease_end.duration_since(now).as_secs().max(1),
                    });
                }
                debug!(device = %key, "half-open probe lost, allowing another");
                *state = BreakerState::HalfOpen { since: now };
                Ok(())
            }
            BreakerState::Closed { .. } => Ok(()),
        }
    }

    pub fn record_success(&self, key: &DeviceKey) {
        if self.states.remove(key).is_some() {
            debug!(device = %key, "circuit closed");
        }
    }

    pub fn record_failure(&self, key: &DeviceKey) {
        if self.threshold == 0 {
            return;
        }

        let mut state = self
            .states
            .entry(key.clone())
            .or_insert(BreakerState::Closed { failures: 0 });

        let next = match *state {
            BreakerState::Closed { failures } if failures + 1 < self.threshold => {
                BreakerState::Closed {
                    failures: failures + 1,
                }
            }
            BreakerState::Closed { .. } | BreakerState::HalfOpen { .. } => {
                warn!(
                    device = %key,
                    cooldown_secs = self.cooldown.as_secs(),
                    "circuit opened after repeated failures"
                );
                BreakerState::Open {
                    until: Instant::now() + self.cooldown,
                }
            }
            // A bypassing manual refresh failed while open; keep the deadline.
            open @ BreakerState::Open { .. } => open,
        };
        *state = next;
    }

    pub fn is_open(&self, key: &DeviceKey) -> bool {
        self.states
            .get(key)
            .is_some_and(|s| matches!(*s, BreakerState::Open { until } if Instant::now() < until))
    }

    pub fn forget(&self, key: &DeviceKey) {
        self.states.remove(key);
    }
}
