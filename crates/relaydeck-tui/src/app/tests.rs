use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use futures::future::BoxFuture;
use pretty_assertions::assert_eq;
use ratatui::Terminal;
use ratatui::backend::TestBackend;
use serde_json::json;

use relaydeck_api::{EventStream, Transport};
use relaydeck_core::{Controller, Device, DeviceKey, Generation, PushEvent, SyncConfig};

use super::*;
use crate::focus::Mode;

/// Transport for a network where nothing answers.
struct Offline;

fn offline<T: Send + 'static>() -> BoxFuture<'static, Result<T, relaydeck_api::Error>> {
    Box::pin(async { Err(relaydeck_api::Error::Unsupported("offline test")) })
}

impl Transport for Offline {
    fn fetch_status<'a>(
        &'a self,
        _address: &'a str,
        _generation: Generation,
    ) -> BoxFuture<'a, Result<serde_json::Value, relaydeck_api::Error>> {
        offline()
    }

    fn fetch_config<'a>(
        &'a self,
        _address: &'a str,
        _generation: Generation,
    ) -> BoxFuture<'a, Result<serde_json::Value, relaydeck_api::Error>> {
        offline()
    }

    fn subscribe<'a>(
        &'a self,
        _address: &'a str,
    ) -> BoxFuture<'a, Result<EventStream, relaydeck_api::Error>> {
        offline()
    }

    fn set_switch<'a>(
        &'a self,
        _address: &'a str,
        _generation: Generation,
        _channel: u8,
        _on: bool,
    ) -> BoxFuture<'a, Result<(), relaydeck_api::Error>> {
        offline()
    }
}

fn app() -> App {
    let devices = vec![
        Device::new("kitchen", "10.0.0.2", Generation::Gen2),
        Device::new("garage", "10.0.0.3", Generation::Gen1),
    ];
    App::new(Controller::new(devices, Arc::new(Offline), SyncConfig::default()))
}

fn press(app: &mut App, code: KeyCode) {
    app.handle_message(Message::Key(KeyEvent::new(code, KeyModifiers::NONE)));
}

fn type_str(app: &mut App, text: &str) {
    for c in text.chars() {
        press(app, KeyCode::Char(c));
    }
}

/// Give `kitchen` one relay that is currently off.
fn kitchen_relay_off(app: &mut App) {
    app.controller.cache().apply_push_event(
        &DeviceKey::new("kitchen"),
        &PushEvent::FullStatus {
            payload: json!({ "switch:0": { "output": false } }),
        },
    );
    app.handle_message(Message::Render);
}

#[tokio::test]
async fn q_quits_from_normal_mode() {
    let mut app = app();
    press(&mut app, KeyCode::Char('q'));
    assert!(!app.running);
}

#[tokio::test]
async fn q_types_into_search_instead_of_quitting() {
    let mut app = app();

    press(&mut app, KeyCode::Char('/'));
    assert_eq!(app.focus.mode(), Mode::Input);

    type_str(&mut app, "gar");
    press(&mut app, KeyCode::Char('q'));
    assert!(app.running);
    assert_eq!(app.search.value(), "garq");
    assert!(app.visible.is_empty());

    press(&mut app, KeyCode::Backspace);
    assert_eq!(app.visible, vec![DeviceKey::new("garage")]);

    // Enter keeps the filter and gives keys back to navigation.
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.focus.mode(), Mode::Normal);
    assert_eq!(app.search.value(), "gar");

    press(&mut app, KeyCode::Char('q'));
    assert!(!app.running);
}

#[tokio::test]
async fn esc_in_search_clears_the_filter() {
    let mut app = app();
    press(&mut app, KeyCode::Char('/'));
    type_str(&mut app, "kit");
    assert_eq!(app.visible.len(), 1);

    press(&mut app, KeyCode::Esc);
    assert_eq!(app.focus.mode(), Mode::Normal);
    assert_eq!(app.search.value(), "");
    assert_eq!(app.visible.len(), 2);
}

#[tokio::test]
async fn balanced_overlay_sequence_returns_to_normal() {
    let mut app = app();

    press(&mut app, KeyCode::Enter);
    assert_eq!(app.focus.top_overlay(), Some(OverlayId::DeviceDetail));
    assert_eq!(
        app.detail.as_ref().map(|d| d.device.clone()),
        Some(DeviceKey::new("kitchen"))
    );

    press(&mut app, KeyCode::Char('?'));
    press(&mut app, KeyCode::Esc);
    assert_eq!(app.focus.top_overlay(), Some(OverlayId::DeviceDetail));

    press(&mut app, KeyCode::Char('/'));
    assert_eq!(app.focus.mode(), Mode::Input);
    type_str(&mut app, "sw");
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.focus.mode(), Mode::Overlay);

    press(&mut app, KeyCode::Esc);
    assert_eq!(app.focus.mode(), Mode::Normal);
    assert!(!app.focus.has_overlay());
    assert!(app.detail.is_none());
}

#[tokio::test]
async fn toggle_waits_for_confirmation() {
    let mut app = app();
    kitchen_relay_off(&mut app);

    press(&mut app, KeyCode::Char('t'));
    assert_eq!(app.focus.mode(), Mode::Modal);
    assert_eq!(
        app.pending_toggle,
        Some(PendingToggle {
            device: DeviceKey::new("kitchen"),
            channel: 0,
            on: true,
        })
    );

    // Unrelated keys do nothing while the dialog is up.
    press(&mut app, KeyCode::Char('q'));
    press(&mut app, KeyCode::Char('2'));
    assert!(app.running);
    assert_eq!(app.focus.active_tab(), Tab::Devices);
    assert_eq!(app.focus.mode(), Mode::Modal);

    press(&mut app, KeyCode::Char('y'));
    assert_eq!(app.focus.mode(), Mode::Normal);
    assert!(app.pending_toggle.is_none());
}

#[tokio::test]
async fn toggle_without_relay_warns() {
    let mut app = app();
    press(&mut app, KeyCode::Char('t'));

    assert_eq!(app.focus.mode(), Mode::Normal);
    let (notification, _) = app.notification.as_ref().expect("warning toast");
    assert_eq!(notification.level, crate::action::NotificationLevel::Warning);
}

#[tokio::test]
async fn refresh_all_waits_for_initial_load() {
    let mut app = app();
    press(&mut app, KeyCode::Char('R'));

    let (notification, _) = app.notification.as_ref().expect("warning toast");
    assert_eq!(notification.level, crate::action::NotificationLevel::Warning);
    assert_eq!(notification.message, "Still loading devices");
}

#[tokio::test]
async fn cancel_drops_the_pending_toggle() {
    let mut app = app();
    kitchen_relay_off(&mut app);

    press(&mut app, KeyCode::Char('t'));
    press(&mut app, KeyCode::Char('n'));
    assert_eq!(app.focus.mode(), Mode::Normal);
    assert!(app.pending_toggle.is_none());
}

#[tokio::test]
async fn ctrl_c_closes_every_overlay_and_quits() {
    let mut app = app();
    kitchen_relay_off(&mut app);

    press(&mut app, KeyCode::Enter);
    press(&mut app, KeyCode::Char('t'));
    assert_eq!(app.focus.depth(), 2);

    app.handle_message(Message::Key(KeyEvent::new(
        KeyCode::Char('c'),
        KeyModifiers::CONTROL,
    )));
    assert!(!app.running);
    assert!(!app.focus.has_overlay());
    assert!(app.detail.is_none());
    assert!(app.pending_toggle.is_none());
}

#[tokio::test]
async fn switching_tab_closes_the_detail_view() {
    let mut app = app();
    press(&mut app, KeyCode::Enter);
    assert!(app.detail.is_some());

    press(&mut app, KeyCode::Char('2'));
    assert_eq!(app.focus.active_tab(), Tab::Energy);
    assert!(!app.focus.has_overlay());
    assert!(app.detail.is_none());
}

#[tokio::test]
async fn help_survives_tab_switch() {
    let mut app = app();
    press(&mut app, KeyCode::Char('?'));

    app.dispatch(Action::SwitchTab(Tab::Events));
    assert_eq!(app.focus.active_tab(), Tab::Events);
    assert_eq!(app.focus.top_overlay(), Some(OverlayId::Help));
}

#[tokio::test]
async fn frame_only_when_cache_changed() {
    let mut app = app();
    assert!(app.take_dirty());

    app.handle_message(Message::Render);
    assert!(!app.take_dirty());

    let before = app.snapshot.version();
    kitchen_relay_off(&mut app);
    assert!(app.take_dirty());
    assert!(app.snapshot.version() > before);

    app.handle_message(Message::Render);
    assert!(!app.take_dirty());
}

#[tokio::test]
async fn selection_follows_device_through_refilter() {
    let mut app = app();
    press(&mut app, KeyCode::Char('j'));
    assert_eq!(app.selected_key(), Some(&DeviceKey::new("garage")));

    press(&mut app, KeyCode::Char('/'));
    type_str(&mut app, "ga");
    assert_eq!(app.selected, 0);
    assert_eq!(app.selected_key(), Some(&DeviceKey::new("garage")));

    press(&mut app, KeyCode::Esc);
    assert_eq!(app.selected_key(), Some(&DeviceKey::new("garage")));
}

#[tokio::test]
async fn device_info_result_lands_in_open_detail() {
    let mut app = app();
    press(&mut app, KeyCode::Enter);

    app.handle_message(Message::Sync(SyncEvent::DeviceInfoLoaded {
        device: DeviceKey::new("garage"),
        result: Ok(DeviceInfo::default()),
    }));
    assert!(app.detail.as_ref().is_some_and(|d| d.info.is_none()));

    app.handle_message(Message::Sync(SyncEvent::DeviceInfoLoaded {
        device: DeviceKey::new("kitchen"),
        result: Ok(DeviceInfo::default()),
    }));
    assert!(app.detail.as_ref().is_some_and(|d| d.info.is_some()));
}

#[tokio::test(start_paused = true)]
async fn toast_expires_after_ttl() {
    let mut app = app();
    app.dispatch(Action::ToggleLogPause);
    assert!(app.notification.is_some());

    tokio::time::advance(Duration::from_secs(1)).await;
    app.handle_message(Message::Tick);
    assert!(app.notification.is_some());

    tokio::time::advance(NOTIFICATION_TTL).await;
    app.handle_message(Message::Tick);
    assert!(app.notification.is_none());
}

#[tokio::test]
async fn renders_every_tab_with_overlays() {
    let mut app = app();
    kitchen_relay_off(&mut app);
    let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("terminal");

    for tab in Tab::ALL {
        app.dispatch(Action::SwitchTab(tab));
        terminal.draw(|frame| app.render(frame)).expect("draw");
    }

    app.dispatch(Action::SwitchTab(Tab::Devices));
    press(&mut app, KeyCode::Enter);
    press(&mut app, KeyCode::Char('t'));
    terminal.draw(|frame| app.render(frame)).expect("draw");
    assert!(screen_text(&terminal).contains("Turn kitchen switch:0 on?"));

    press(&mut app, KeyCode::Esc);
    press(&mut app, KeyCode::Esc);
    press(&mut app, KeyCode::Char('?'));
    terminal.draw(|frame| app.render(frame)).expect("draw");
    assert!(screen_text(&terminal).contains("Keyboard Shortcuts"));
}

fn screen_text(terminal: &Terminal<TestBackend>) -> String {
    terminal
        .backend()
        .buffer()
        .content()
        .iter()
        .map(|cell| cell.symbol())
        .collect()
}
