//! Palette and semantic styles for the console.

use ratatui::style::{Color, Modifier, Style};

use relaydeck_core::LogLevel;

use crate::action::NotificationLevel;

// ── Palette ───────────────────────────────────────────────────────────

pub const AMBER: Color = Color::Rgb(255, 184, 76); // #ffb84c
pub const TEAL: Color = Color::Rgb(94, 234, 212); // #5eead4
pub const VIOLET: Color = Color::Rgb(196, 128, 255); // #c480ff
pub const GREEN: Color = Color::Rgb(80, 250, 123); // #50fa7b
pub const RED: Color = Color::Rgb(255, 99, 99); // #ff6363
pub const YELLOW: Color = Color::Rgb(241, 250, 140); // #f1fa8c

pub const DIM_WHITE: Color = Color::Rgb(189, 193, 207); // #bdc1cf
pub const BORDER_GRAY: Color = Color::Rgb(98, 114, 164); // #6272a4
pub const BG_HIGHLIGHT: Color = Color::Rgb(40, 42, 54); // #282a36
pub const BG_DARK: Color = Color::Rgb(30, 31, 41); // #1e1f29

// ── Chrome ────────────────────────────────────────────────────────────

pub fn title_style() -> Style {
    Style::default().fg(TEAL).add_modifier(Modifier::BOLD)
}

pub fn border_focused() -> Style {
    Style::default().fg(AMBER)
}

pub fn border_default() -> Style {
    Style::default().fg(BORDER_GRAY)
}

pub fn border(focused: bool) -> Style {
    if focused {
        border_focused()
    } else {
        border_default()
    }
}

pub fn table_header() -> Style {
    Style::default()
        .fg(TEAL)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
}

pub fn table_row() -> Style {
    Style::default().fg(DIM_WHITE)
}

pub fn table_selected() -> Style {
    Style::default()
        .fg(AMBER)
        .bg(BG_HIGHLIGHT)
        .add_modifier(Modifier::BOLD)
}

pub fn tab_active() -> Style {
    Style::default().fg(AMBER).add_modifier(Modifier::BOLD)
}

pub fn tab_inactive() -> Style {
    Style::default().fg(DIM_WHITE)
}

/// Key hint text (e.g., "q quit  ? help").
pub fn key_hint() -> Style {
    Style::default().fg(BORDER_GRAY)
}

pub fn key_hint_key() -> Style {
    Style::default().fg(TEAL).add_modifier(Modifier::BOLD)
}

pub fn popup_background() -> Style {
    Style::default().bg(BG_DARK)
}

// ── Device state ──────────────────────────────────────────────────────

/// Status dot and color for a device row.
pub fn device_status(online: bool, stale: bool) -> (&'static str, Style) {
    match (online, stale) {
        (true, _) => ("●", Style::default().fg(GREEN)),
        (false, true) => ("◐", Style::default().fg(YELLOW)),
        (false, false) => ("○", Style::default().fg(RED)),
    }
}

pub fn relay(on: bool) -> Style {
    if on {
        Style::default().fg(GREEN).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(BORDER_GRAY)
    }
}

pub fn power() -> Style {
    Style::default().fg(VIOLET)
}

pub fn log_level(level: LogLevel) -> Style {
    match level {
        LogLevel::Info => Style::default().fg(TEAL),
        LogLevel::Warn => Style::default().fg(YELLOW),
        LogLevel::Error => Style::default().fg(RED).add_modifier(Modifier::BOLD),
    }
}

/// Border color and icon of a toast.
pub fn notification(level: NotificationLevel) -> (Color, &'static str) {
    match level {
        NotificationLevel::Success => (GREEN, "✓"),
        NotificationLevel::Error => (RED, "✗"),
        NotificationLevel::Warning => (YELLOW, "!"),
        NotificationLevel::Info => (TEAL, "·"),
    }
}
