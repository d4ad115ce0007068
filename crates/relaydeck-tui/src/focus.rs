//! Focus state: which tab and panel are active, and which overlays sit on
//! top of them.
//!
//! The input [`Mode`] is derived, never stored: it is the mode tag of the
//! topmost overlay, or [`Mode::Normal`] when the stack is empty. Only the
//! orchestrator thread touches this state.

use std::fmt;

use tracing::{debug, warn};

// ── Tabs and panels ──────────────────────────────────────────────────

/// Primary views, navigable by number keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tab {
    #[default]
    Devices, // 1
    Energy, // 2
    Events, // 3
}

impl Tab {
    /// All tabs in tab-bar order.
    pub const ALL: [Tab; 3] = [Self::Devices, Self::Energy, Self::Events];

    pub fn number(self) -> u8 {
        match self {
            Self::Devices => 1,
            Self::Energy => 2,
            Self::Events => 3,
        }
    }

    /// Tab from a numeric key (1-3). Returns None for out-of-range.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Devices),
            2 => Some(Self::Energy),
            3 => Some(Self::Events),
            _ => None,
        }
    }

    /// Next tab in tab order (wraps around).
    pub fn next(self) -> Self {
        let idx = self.index();
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Previous tab in tab order (wraps around).
    pub fn prev(self) -> Self {
        let idx = self.index();
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&t| t == self).unwrap_or(0)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Devices => "Devices",
            Self::Energy => "Energy",
            Self::Events => "Events",
        }
    }

    /// Panels of this tab in focus-cycling order. The first is the default.
    pub fn panels(self) -> &'static [Panel] {
        match self {
            Self::Devices => &[Panel::DeviceList, Panel::Components],
            Self::Energy => &[Panel::Meters],
            Self::Events => &[Panel::EventLog],
        }
    }

    pub fn default_panel(self) -> Panel {
        self.panels().first().copied().unwrap_or(Panel::DeviceList)
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A focusable region inside a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    DeviceList,
    Components,
    Meters,
    EventLog,
}

// ── Overlays ─────────────────────────────────────────────────────────

/// How keys are routed while an overlay is on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// No overlay: the full tab/panel keymap applies.
    #[default]
    Normal,
    /// A text field owns every key.
    Input,
    /// A popup with its own small keymap; Esc closes it.
    Overlay,
    /// A dialog that only answers confirm or cancel.
    Modal,
}

/// What a search field filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchTarget {
    /// The device list of the Devices and Energy tabs.
    Devices,
    /// The component rows of the open detail view.
    Detail,
}

/// Identity of a surface that can sit on the overlay stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayId {
    Help,
    DeviceDetail,
    Search(SearchTarget),
    ConfirmToggle,
}

/// Whether an overlay belongs to the current tab or to the whole app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Survives tab switches.
    Global,
    /// Closed when the active tab changes.
    Tab,
}

impl OverlayId {
    pub fn scope(self) -> Scope {
        match self {
            Self::Help | Self::ConfirmToggle => Scope::Global,
            Self::DeviceDetail | Self::Search(_) => Scope::Tab,
        }
    }

    /// The mode this overlay is normally opened with.
    pub fn default_mode(self) -> Mode {
        match self {
            Self::Help | Self::DeviceDetail => Mode::Overlay,
            Self::Search(_) => Mode::Input,
            Self::ConfirmToggle => Mode::Modal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OverlayEntry {
    id: OverlayId,
    mode: Mode,
}

// ── FocusState ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FocusState {
    active_tab: Tab,
    /// Active panel per tab, indexed like [`Tab::ALL`].
    panels: [Panel; 3],
    /// Bottom first; the last entry owns input.
    stack: Vec<OverlayEntry>,
}

impl Default for FocusState {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusState {
    pub fn new() -> Self {
        Self {
            active_tab: Tab::default(),
            panels: Tab::ALL.map(Tab::default_panel),
            stack: Vec::new(),
        }
    }

    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    pub fn active_panel(&self) -> Panel {
        self.panels[self.active_tab.index()]
    }

    /// Current input mode, derived from the top of the overlay stack.
    pub fn mode(&self) -> Mode {
        self.stack.last().map_or(Mode::Normal, |entry| entry.mode)
    }

    /// Whether `panel` is the active panel of the active tab and no overlay
    /// holds input.
    pub fn is_panel_focused(&self, panel: Panel) -> bool {
        self.stack.is_empty() && self.active_panel() == panel
    }

    // ── Overlay stack ───────────────────────────────────────────────

    /// Push `id` tagged with `mode`. An overlay already on the stack is
    /// not pushed twice; returns `false` in that case.
    pub fn push_overlay(&mut self, id: OverlayId, mode: Mode) -> bool {
        if self.contains(id) {
            warn!(overlay = ?id, "overlay already open, ignoring push");
            return false;
        }
        if mode == Mode::Normal {
            warn!(overlay = ?id, "overlays cannot be pushed in normal mode, ignoring push");
            return false;
        }
        debug!(overlay = ?id, ?mode, depth = self.stack.len() + 1, "overlay opened");
        self.stack.push(OverlayEntry { id, mode });
        true
    }

    /// Pop the top overlay. Popping an empty stack is logged and ignored.
    pub fn pop_overlay(&mut self) -> Option<OverlayId> {
        let Some(entry) = self.stack.pop() else {
            warn!("pop on empty overlay stack, ignoring");
            return None;
        };
        debug!(overlay = ?entry.id, depth = self.stack.len(), "overlay closed");
        Some(entry.id)
    }

    pub fn has_overlay(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn top_overlay(&self) -> Option<OverlayId> {
        self.stack.last().map(|entry| entry.id)
    }

    pub fn contains(&self, id: OverlayId) -> bool {
        self.stack.iter().any(|entry| entry.id == id)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Overlays from bottom to top.
    pub fn overlays(&self) -> impl Iterator<Item = OverlayId> + '_ {
        self.stack.iter().map(|entry| entry.id)
    }

    /// Close every overlay, topmost first. Returns what was closed in that order.
    pub fn close_all(&mut self) -> Vec<OverlayId> {
        let closed: Vec<OverlayId> = self.stack.drain(..).rev().map(|entry| entry.id).collect();
        if !closed.is_empty() {
            debug!(count = closed.len(), "all overlays closed");
        }
        closed
    }

    // ── Navigation ──────────────────────────────────────────────────

    pub fn next_panel(&mut self) {
        self.step_panel(1);
    }

    pub fn prev_panel(&mut self) {
        let len = self.active_tab.panels().len();
        self.step_panel(len.saturating_sub(1));
    }

    fn step_panel(&mut self, step: usize) {
        let panels = self.active_tab.panels();
        let current = self.active_panel();
        let idx = panels.iter().position(|&p| p == current).unwrap_or(0);
        if let Some(&next) = panels.get((idx + step) % panels.len().max(1)) {
            self.panels[self.active_tab.index()] = next;
        }
    }

    /// Activate `tab`, reset its panel to the default, and close the
    /// tab-scoped overlays. Global overlays keep their order. Returns the
    /// closed overlays, topmost first.
    pub fn set_active_tab(&mut self, tab: Tab) -> Vec<OverlayId> {
        let mut closed = Vec::new();
        self.stack.retain(|entry| {
            let keep = entry.id.scope() == Scope::Global;
            if !keep {
                closed.push(entry.id);
            }
            keep
        });
        closed.reverse();

        if tab != self.active_tab {
            debug!(from = %self.active_tab, to = %tab, "switching tab");
        }
        self.active_tab = tab;
        self.panels[tab.index()] = tab.default_panel();
        closed
    }
}
