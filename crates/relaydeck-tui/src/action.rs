//! Semantic actions produced by the keymap, plus the notification and
//! confirmation payloads they carry.

use std::fmt;

use relaydeck_core::DeviceKey;

use crate::focus::{SearchTarget, Tab};

/// Notification severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A toast notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
}

impl Notification {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Success,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Error,
        }
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Warning,
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Info,
        }
    }
}

/// Relay toggle waiting for the user's confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToggle {
    pub device: DeviceKey,
    pub channel: u8,
    /// Target state.
    pub on: bool,
}

impl fmt::Display for PendingToggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.on { "on" } else { "off" };
        write!(f, "Turn {} switch:{} {state}?", self.device, self.channel)
    }
}

/// Everything a key can ask the orchestrator to do. Decoupled from the
/// physical key that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    // ── Lifecycle ──────────────────────────────────────────────────
    Quit,
    /// Close every overlay, then quit.
    ForceQuit,

    // ── Navigation ────────────────────────────────────────────────
    SwitchTab(Tab),
    NextTab,
    PrevTab,
    NextPanel,
    PrevPanel,
    SelectNext,
    SelectPrev,
    SelectFirst,
    SelectLast,

    // ── Overlays ──────────────────────────────────────────────────
    OpenHelp,
    OpenSearch(SearchTarget),
    OpenDetail,
    CloseOverlay,

    // ── Device commands ───────────────────────────────────────────
    RefreshSelected,
    RefreshAll,
    /// Ask to flip the selected relay; opens the confirmation dialog.
    ToggleSelected,

    // ── Confirm dialog ────────────────────────────────────────────
    Confirm,
    Cancel,

    // ── Event log ─────────────────────────────────────────────────
    ToggleLogPause,
    ClearLog,
}
