// ── Event log ──
//
// Bounded, newest-first ring of notable sync events (connects, drops,
// switch toggles, fetch failures). Writers never wait on readers: the
// ring only grows to its capacity, and a paused log silently discards
// new entries until resumed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::model::DeviceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub device: DeviceKey,
    pub level: LogLevel,
    pub message: String,
}

pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    paused: AtomicBool,
    /// Bumped on every visible change so renderers can skip unchanged frames.
    revision: AtomicU64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            paused: AtomicBool::new(false),
            revision: AtomicU64::new(0),
        }
    }

    /// Returns `false` when the entry was discarded because the log is paused.
    pub fn push(&self, device: &DeviceKey, level: LogLevel, message: impl Into<String>) -> bool {
        if self.is_paused() {
            return false;
        }

        let entry = LogEntry {
            at: Utc::now(),
            device: device.clone(),
            level,
            message: message.into(),
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_front(entry);
        entries.truncate(self.capacity);
        drop(entries);

        self.revision.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn info(&self, device: &DeviceKey, message: impl Into<String>) -> bool {
        self.push(device, LogLevel::Info, message)
    }

    pub fn warn(&self, device: &DeviceKey, message: impl Into<String>) -> bool {
        self.push(device, LogLevel::Warn, message)
    }

    pub fn error(&self, device: &DeviceKey, message: impl Into<String>) -> bool {
        self.push(device, LogLevel::Error, message)
    }

    /// Newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.revision.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        if self.paused.swap(paused, Ordering::Relaxed) != paused {
            self.revision.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Flip the pause flag and return the new value.
    pub fn toggle_paused(&self) -> bool {
        let paused = !self.paused.fetch_xor(true, Ordering::Relaxed);
        self.revision.fetch_add(1, Ordering::Relaxed);
        paused
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Relaxed)
    }
}
