//! Application core: the single-threaded orchestrator.
//!
//! Every input (keys, sync results, clocks) arrives as a [`Message`] and is
//! applied by [`App::handle_message`], one at a time. Keys are routed
//! through [`FocusState`] and the keymap into [`Action`]s; sync results
//! update notifications and the detail view; the `Render` clock re-reads
//! the cache snapshot only when its version moved.

mod render;
#[cfg(test)]
mod tests;

use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tui_input::Input;

use relaydeck_core::{CacheSnapshot, Controller, DeviceInfo, DeviceKey, LogEntry, SyncEvent};

use crate::action::{Action, Notification, PendingToggle};
use crate::data_bridge::spawn_data_bridge;
use crate::event::{EventReader, Rates};
use crate::focus::{FocusState, OverlayId, Panel, SearchTarget, Tab};
use crate::keymap::{self, Context, Route};
use crate::message::Message;
use crate::screens::components::{self, ComponentRow};
use crate::screens::devices;
use crate::tui::Session;
use crate::widgets::search;

/// Toasts disappear after this long.
const NOTIFICATION_TTL: Duration = Duration::from_secs(3);
const TICK_RATE: Duration = Duration::from_millis(250);
const RENDER_RATE: Duration = Duration::from_millis(33);

/// State of the open device detail overlay.
struct DetailState {
    device: DeviceKey,
    /// `None` until the configuration document arrives.
    info: Option<Result<DeviceInfo, String>>,
    filter: Input,
    selected: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next,
    Prev,
    First,
    Last,
}

fn step(current: usize, len: usize, direction: Step) -> usize {
    if len == 0 {
        return 0;
    }
    match direction {
        Step::Next => (current + 1).min(len - 1),
        Step::Prev => current.saturating_sub(1),
        Step::First => 0,
        Step::Last => len - 1,
    }
}

fn clamp(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

/// Top-level application state and event loop.
pub struct App {
    controller: Controller,
    focus: FocusState,
    running: bool,
    /// Something visible changed since the last frame.
    dirty: bool,

    // ── View of the sync engine ──
    snapshot: CacheSnapshot,
    log_entries: Vec<LogEntry>,
    log_revision: u64,
    initial_load_done: bool,
    last_poll: Option<DateTime<Utc>>,

    // ── Selection and filters ──
    /// Devices matching the search filter, in configuration order.
    visible: Vec<DeviceKey>,
    selected: usize,
    component_selected: usize,
    log_selected: usize,
    search: Input,
    detail: Option<DetailState>,

    // ── Transient surfaces ──
    pending_toggle: Option<PendingToggle>,
    notification: Option<(Notification, Instant)>,
}

impl App {
    pub fn new(controller: Controller) -> Self {
        let snapshot = controller.snapshot();
        let visible = devices::visible_keys(&snapshot, "");
        let log_revision = controller.log().revision();
        let log_entries = controller.log().entries();

        Self {
            controller,
            focus: FocusState::new(),
            running: true,
            dirty: true,
            snapshot,
            log_entries,
            log_revision,
            initial_load_done: false,
            last_poll: None,
            visible,
            selected: 0,
            component_selected: 0,
            log_selected: 0,
            search: Input::default(),
            detail: None,
            pending_toggle: None,
            notification: None,
        }
    }

    /// Run the main event loop until quit, then shut the controller down
    /// before the terminal is restored.
    pub async fn run(&mut self) -> Result<()> {
        let mut session = Session::open()?;

        let mut events = EventReader::new(Rates {
            tick: TICK_RATE,
            render: RENDER_RATE,
            poll: Some(self.controller.config().poll_interval),
        });

        let bridge_cancel = CancellationToken::new();
        let bridge = self
            .controller
            .take_events()
            .map(|rx| spawn_data_bridge(rx, events.sender(), bridge_cancel.clone()));

        self.controller.start();
        info!(devices = self.snapshot.len(), "TUI event loop started");

        let result = self.event_loop(&mut session, &mut events).await;

        events.stop();
        bridge_cancel.cancel();
        if let Some(bridge) = bridge {
            let _ = bridge.await;
        }
        session.close(&self.controller).await;

        info!("TUI event loop ended");
        result
    }

    async fn event_loop(&mut self, session: &mut Session, events: &mut EventReader) -> Result<()> {
        while self.running {
            let Some(message) = events.next().await else {
                break;
            };

            let frame_due = matches!(message, Message::Render);
            self.handle_message(message);

            if frame_due && self.take_dirty() {
                session.terminal().draw(|frame| self.render(frame))?;
            }
        }
        Ok(())
    }

    /// Apply one inbound message.
    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::Key(key) => self.handle_key(key),
            Message::Sync(event) => self.handle_sync(event),
            Message::Tick => self.expire_notification(),
            Message::PollTick => self.controller.request_poll(),
            Message::Render => self.sync_view(),
            Message::Resize(width, height) => {
                debug!(width, height, "terminal resized");
                self.dirty = true;
            }
        }
    }

    /// Whether a frame should be drawn; resets the flag.
    fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // ── View refresh ─────────────────────────────────────────────────

    /// Re-read the cache and the event log, but only what changed.
    fn sync_view(&mut self) {
        if self.controller.version() != self.snapshot.version() {
            self.snapshot = self.controller.snapshot();
            self.refilter();
            self.dirty = true;
        }

        let revision = self.controller.log().revision();
        if revision != self.log_revision {
            self.log_revision = revision;
            self.log_entries = self.controller.log().entries();
            self.log_selected = clamp(self.log_selected, self.log_entries.len());
            self.dirty = true;
        }
    }

    /// Recompute the visible device list, keeping the selected device
    /// selected while it stays visible.
    fn refilter(&mut self) {
        let previous = self.selected_key().cloned();
        self.visible = devices::visible_keys(&self.snapshot, self.search.value());
        self.selected = previous
            .and_then(|key| self.visible.iter().position(|k| *k == key))
            .unwrap_or_else(|| clamp(self.selected, self.visible.len()));
    }

    fn selected_key(&self) -> Option<&DeviceKey> {
        self.visible.get(self.selected)
    }

    /// The device commands apply to: the detail view's, else the selection.
    fn focused_device(&self) -> Option<DeviceKey> {
        self.detail
            .as_ref()
            .map(|d| d.device.clone())
            .or_else(|| self.selected_key().cloned())
    }

    fn component_rows(&self, key: &DeviceKey) -> Vec<ComponentRow> {
        self.snapshot
            .state(key)
            .map(|state| components::rows(&state.components))
            .unwrap_or_default()
    }

    fn detail_rows(&self) -> Vec<ComponentRow> {
        let Some(detail) = &self.detail else {
            return Vec::new();
        };
        let info = detail.info.as_ref().and_then(|r| r.as_ref().ok());
        components::filtered(
            self.component_rows(&detail.device),
            detail.filter.value(),
            info,
        )
    }

    // ── Keys ─────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) {
        let ctx = Context::from_focus(&self.focus);
        let handled = match keymap::resolve(&ctx, key) {
            Route::Action(action) => {
                debug!(?action, mode = ?ctx.mode, "dispatching action");
                self.dispatch(action);
                true
            }
            Route::Raw(key) => {
                self.handle_raw(key);
                true
            }
            Route::Unbound => false,
        };
        if handled {
            self.dirty = true;
        }
    }

    /// Keys forwarded untranslated to the surface on top.
    fn handle_raw(&mut self, key: KeyEvent) {
        match self.focus.top_overlay() {
            Some(OverlayId::Search(target)) => self.edit_search(target, key),
            other => debug!(overlay = ?other, code = ?key.code, "raw key ignored"),
        }
    }

    fn edit_search(&mut self, target: SearchTarget, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                if let Some(input) = self.search_input(target) {
                    input.reset();
                }
                self.filter_changed(target);
                self.close_top();
            }
            KeyCode::Enter => self.close_top(),
            _ => {
                let Some(request) = search::input_request(key) else {
                    return;
                };
                let changed = self
                    .search_input(target)
                    .and_then(|input| input.handle(request))
                    .is_some();
                if changed {
                    self.filter_changed(target);
                }
            }
        }
    }

    fn search_input(&mut self, target: SearchTarget) -> Option<&mut Input> {
        match target {
            SearchTarget::Devices => Some(&mut self.search),
            SearchTarget::Detail => self.detail.as_mut().map(|d| &mut d.filter),
        }
    }

    fn filter_changed(&mut self, target: SearchTarget) {
        match target {
            SearchTarget::Devices => self.refilter(),
            SearchTarget::Detail => {
                if let Some(detail) = self.detail.as_mut() {
                    detail.selected = 0;
                }
            }
        }
    }

    // ── Actions ──────────────────────────────────────────────────────

    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::Quit => self.running = false,
            Action::ForceQuit => {
                self.close_all_overlays();
                self.running = false;
            }

            Action::SwitchTab(tab) => self.switch_tab(tab),
            Action::NextTab => self.switch_tab(self.focus.active_tab().next()),
            Action::PrevTab => self.switch_tab(self.focus.active_tab().prev()),
            Action::NextPanel => self.focus.next_panel(),
            Action::PrevPanel => self.focus.prev_panel(),
            Action::SelectNext => self.move_selection(Step::Next),
            Action::SelectPrev => self.move_selection(Step::Prev),
            Action::SelectFirst => self.move_selection(Step::First),
            Action::SelectLast => self.move_selection(Step::Last),

            Action::OpenHelp => {
                self.open_overlay(OverlayId::Help);
            }
            Action::OpenSearch(target) => self.open_search(target),
            Action::OpenDetail => self.open_detail(),
            Action::CloseOverlay => self.close_top(),

            Action::RefreshSelected => self.refresh_selected(),
            Action::RefreshAll => {
                if self.controller.request_refresh_all() {
                    self.notify(Notification::info("Refreshing all devices"));
                } else {
                    self.notify(Notification::warning("Still loading devices"));
                }
            }
            Action::ToggleSelected => self.request_toggle(),
            Action::Confirm => self.confirm_toggle(),
            Action::Cancel => self.cancel_toggle(),

            Action::ToggleLogPause => {
                let paused = self.controller.log().toggle_paused();
                let msg = if paused {
                    "Event log paused"
                } else {
                    "Event log resumed"
                };
                self.notify(Notification::info(msg));
            }
            Action::ClearLog => {
                self.controller.log().clear();
                self.log_selected = 0;
                self.notify(Notification::info("Event log cleared"));
            }
        }
    }

    fn switch_tab(&mut self, tab: Tab) {
        for id in self.focus.set_active_tab(tab) {
            self.overlay_closed(id);
        }
    }

    fn move_selection(&mut self, direction: Step) {
        if self.focus.top_overlay() == Some(OverlayId::DeviceDetail) {
            let len = self.detail_rows().len();
            if let Some(detail) = self.detail.as_mut() {
                detail.selected = step(detail.selected, len, direction);
            }
            return;
        }

        match self.focus.active_panel() {
            Panel::DeviceList | Panel::Meters => {
                let next = step(self.selected, self.visible.len(), direction);
                if next != self.selected {
                    self.selected = next;
                    self.component_selected = 0;
                }
            }
            Panel::Components => {
                let len = self
                    .selected_key()
                    .map_or(0, |key| self.component_rows(key).len());
                self.component_selected = step(self.component_selected, len, direction);
            }
            Panel::EventLog => {
                self.log_selected = step(self.log_selected, self.log_entries.len(), direction);
            }
        }
    }

    // ── Overlays ─────────────────────────────────────────────────────

    fn open_search(&mut self, target: SearchTarget) {
        if target == SearchTarget::Detail && self.detail.is_none() {
            warn!("detail search requested without an open detail view");
            return;
        }
        self.open_overlay(OverlayId::Search(target));
    }

    fn open_detail(&mut self) {
        let Some(key) = self.selected_key().cloned() else {
            return;
        };
        if !self.open_overlay(OverlayId::DeviceDetail) {
            return;
        }
        self.controller.request_device_info(&key);
        self.detail = Some(DetailState {
            device: key,
            info: None,
            filter: Input::default(),
            selected: 0,
        });
    }

    fn open_overlay(&mut self, id: OverlayId) -> bool {
        let opened = self.focus.push_overlay(id, id.default_mode());
        if opened {
            debug!(overlay = ?id, depth = self.focus.depth(), "overlay opened");
        }
        opened
    }

    fn close_top(&mut self) {
        if let Some(id) = self.focus.pop_overlay() {
            debug!(overlay = ?id, depth = self.focus.depth(), "overlay closed");
            self.overlay_closed(id);
        }
    }

    fn close_all_overlays(&mut self) {
        for id in self.focus.close_all() {
            self.overlay_closed(id);
        }
    }

    /// Release the state owned by an overlay that left the stack.
    fn overlay_closed(&mut self, id: OverlayId) {
        match id {
            OverlayId::DeviceDetail => self.detail = None,
            OverlayId::ConfirmToggle => self.pending_toggle = None,
            OverlayId::Help | OverlayId::Search(_) => {}
        }
    }

    // ── Device commands ──────────────────────────────────────────────

    fn refresh_selected(&mut self) {
        let Some(key) = self.focused_device() else {
            return;
        };
        if self.controller.request_refresh(&key) {
            self.notify(Notification::info(format!("Refreshing {key}")));
        } else {
            self.notify(Notification::warning(format!(
                "{key}: refresh already requested"
            )));
        }
    }

    /// Open the confirmation dialog for the selected relay, or the
    /// device's first relay when the selection is not one.
    fn request_toggle(&mut self) {
        let Some(key) = self.focused_device() else {
            return;
        };

        let (rows, selected) = if let Some(detail) = &self.detail {
            (self.detail_rows(), Some(detail.selected))
        } else if self.focus.active_panel() == Panel::Components {
            (self.component_rows(&key), Some(self.component_selected))
        } else {
            (self.component_rows(&key), None)
        };

        let target = selected
            .and_then(|i| rows.get(i))
            .filter(|row| row.switch_channel.is_some())
            .or_else(|| rows.iter().find(|row| row.switch_channel.is_some()));

        let Some((channel, on)) = target.and_then(|row| Some((row.switch_channel?, row.on?)))
        else {
            self.notify(Notification::warning(format!("{key} has no switchable relay")));
            return;
        };

        if self.open_overlay(OverlayId::ConfirmToggle) {
            self.pending_toggle = Some(PendingToggle {
                device: key,
                channel,
                on: !on,
            });
        }
    }

    fn confirm_toggle(&mut self) {
        if self.focus.top_overlay() != Some(OverlayId::ConfirmToggle) {
            warn!("confirm without an open confirmation dialog");
            return;
        }
        let pending = self.pending_toggle.take();
        self.close_top();

        if let Some(toggle) = pending {
            info!(device = %toggle.device, channel = toggle.channel, on = toggle.on, "toggle confirmed");
            self.controller
                .request_switch(&toggle.device, toggle.channel, toggle.on);
        }
    }

    fn cancel_toggle(&mut self) {
        if self.focus.top_overlay() != Some(OverlayId::ConfirmToggle) {
            warn!("cancel without an open confirmation dialog");
            return;
        }
        self.close_top();
    }

    // ── Sync results ─────────────────────────────────────────────────

    fn handle_sync(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::WaveStarted { .. } | SyncEvent::WaveSettled { .. } => {}
            SyncEvent::AllDevicesLoaded { online, offline } => {
                self.initial_load_done = true;
                let notification = if offline == 0 {
                    Notification::success(format!("{online} devices online"))
                } else {
                    Notification::warning(format!("{online} online, {offline} offline"))
                };
                self.notify(notification);
            }
            SyncEvent::DeviceUpdated { device, version } => {
                debug!(device = %device, version, "device updated");
            }
            SyncEvent::PollFinished { version, failed } => {
                debug!(version, failed, "poll finished");
                self.last_poll = Some(Utc::now());
            }
            SyncEvent::RefreshFinished { device, result } => match result {
                Ok(()) => self.notify(Notification::success(format!("{device} refreshed"))),
                Err(e) => self.notify(Notification::error(format!("{device}: {e}"))),
            },
            SyncEvent::SubscriptionEnded { device, reason } => {
                debug!(device = %device, reason, "push subscription ended");
            }
            SyncEvent::CommandFinished {
                device,
                channel,
                on,
                result,
            } => {
                let state = if on { "on" } else { "off" };
                match result {
                    Ok(()) => self.notify(Notification::success(format!(
                        "{device} switch:{channel} {state}"
                    ))),
                    Err(e) => self.notify(Notification::error(format!(
                        "{device} switch:{channel}: {e}"
                    ))),
                }
            }
            SyncEvent::DeviceInfoLoaded { device, result } => {
                if let Some(detail) = self.detail.as_mut().filter(|d| d.device == device) {
                    detail.info = Some(result.map_err(|e| e.to_string()));
                }
            }
        }
        self.dirty = true;
    }

    // ── Notifications ────────────────────────────────────────────────

    fn notify(&mut self, notification: Notification) {
        self.notification = Some((notification, Instant::now()));
        self.dirty = true;
    }

    fn expire_notification(&mut self) {
        let expired = self
            .notification
            .as_ref()
            .is_some_and(|(_, shown)| shown.elapsed() >= NOTIFICATION_TTL);
        if expired {
            self.notification = None;
            self.dirty = true;
        }
    }
}
