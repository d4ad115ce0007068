//! Device detail overlay: identity, health, configuration metadata, and a
//! filterable component table.

use chrono::{Local, Utc};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use tui_input::Input;

use relaydeck_core::{DeviceEntry, DeviceInfo, DeviceKey};

use super::components::{self, ComponentRow};
use crate::theme;
use crate::widgets::{self, search, units};

pub struct DetailView<'a> {
    pub key: &'a DeviceKey,
    pub entry: Option<&'a DeviceEntry>,
    /// `None` while the configuration document is loading.
    pub info: Option<&'a Result<DeviceInfo, String>>,
    pub rows: &'a [ComponentRow],
    pub selected: usize,
    pub filter: &'a Input,
    /// The nested search field owns input.
    pub searching: bool,
}

pub fn render(frame: &mut Frame, area: Rect, view: &DetailView<'_>) {
    let popup_area = widgets::centered(area, 76, 24);
    let inner = widgets::popup(
        frame,
        popup_area,
        &format!("Device {}", view.key),
        theme::border_focused(),
    );

    let layout = Layout::vertical([
        Constraint::Length(6), // identity + health
        Constraint::Min(3),    // components
        Constraint::Length(1), // filter / hints
    ])
    .split(inner);

    frame.render_widget(Paragraph::new(summary_lines(view)), layout[0]);

    let selected = (!view.rows.is_empty()).then_some(view.selected);
    components::render(
        frame,
        layout[1],
        format!(" Components ({}) ", view.rows.len()),
        view.rows,
        selected,
        !view.searching,
    );

    if view.searching || !view.filter.value().is_empty() {
        search::render(frame, layout[2], view.filter, view.searching);
    } else {
        let hints = Line::from(vec![
            Span::styled(" t ", theme::key_hint_key()),
            Span::styled("toggle  ", theme::key_hint()),
            Span::styled("r ", theme::key_hint_key()),
            Span::styled("refresh  ", theme::key_hint()),
            Span::styled("/ ", theme::key_hint_key()),
            Span::styled("filter  ", theme::key_hint()),
            Span::styled("Esc ", theme::key_hint_key()),
            Span::styled("close", theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(hints), layout[2]);
    }
}

fn summary_lines(view: &DetailView<'_>) -> Vec<Line<'static>> {
    let label = |text: &'static str| Span::styled(format!("  {text:<10}"), theme::key_hint());
    let value = |text: String| Span::styled(text, Style::default().fg(theme::DIM_WHITE));

    let Some(entry) = view.entry else {
        return vec![Line::from(Span::styled(
            "  device no longer configured",
            Style::default().fg(theme::RED),
        ))];
    };
    let device = &entry.device;
    let state = &entry.state;

    let (dot, dot_style) = theme::device_status(state.online, state.stale);
    let health = match (state.online, &state.last_error) {
        (true, _) => "online".to_owned(),
        (false, Some(err)) if state.stale => format!("offline, showing last readings ({err})"),
        (false, Some(err)) => format!("offline ({err})"),
        (false, None) => "offline".to_owned(),
    };

    let push = if device.supports_push() { "push" } else { "polling" };
    let updated = match state.last_fetch {
        Some(at) => format!(
            "{} ({})",
            at.with_timezone(&Local).format("%H:%M:%S"),
            units::fmt_age(Some(at), Utc::now())
        ),
        None => "never".to_owned(),
    };

    let info_line = match view.info {
        None => Line::from(vec![label("Model"), value("loading…".into())]),
        Some(Err(e)) => Line::from(vec![
            label("Model"),
            Span::styled(format!("unavailable: {e}"), Style::default().fg(theme::YELLOW)),
        ]),
        Some(Ok(info)) => Line::from(vec![
            label("Model"),
            value(info.model.clone().unwrap_or_else(|| "unknown".into())),
            Span::styled("  mac ", theme::key_hint()),
            value(info.mac.clone().unwrap_or_else(|| "—".into())),
            Span::styled("  fw ", theme::key_hint()),
            value(info.firmware.clone().unwrap_or_else(|| "—".into())),
        ]),
    };

    vec![
        Line::from(vec![
            label("Status"),
            Span::styled(format!("{dot} "), dot_style),
            value(health),
        ]),
        Line::from(vec![
            label("Address"),
            value(device.address.clone()),
            Span::styled(format!("  {} · {push}", device.generation), theme::key_hint()),
        ]),
        info_line,
        Line::from(vec![label("Updated"), value(updated)]),
        Line::from(vec![
            label("Power"),
            Span::styled(units::fmt_power(state.telemetry.power), theme::power()),
            Span::styled("  ", theme::key_hint()),
            value(units::fmt_voltage(state.telemetry.voltage)),
            Span::styled("  ", theme::key_hint()),
            value(units::fmt_energy(state.telemetry.energy)),
        ]),
    ]
}
