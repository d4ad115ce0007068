//! Devices tab: filterable device list beside the selected device's
//! components.

use chrono::Utc;
use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::text::Span;
use ratatui::widgets::{Cell, Row, Table, TableState};

use relaydeck_core::{CacheSnapshot, Device, DeviceKey};

use crate::theme;
use crate::widgets::{self, units};

/// Keys of the devices whose name or address contains `filter`
/// (case-insensitive), in configuration order.
pub fn visible_keys(snapshot: &CacheSnapshot, filter: &str) -> Vec<DeviceKey> {
    let needle = filter.trim().to_lowercase();
    snapshot
        .iter()
        .filter(|(_, entry)| matches(&entry.device, &needle))
        .map(|(key, _)| key.clone())
        .collect()
}

/// `needle` must already be lowercase.
pub fn matches(device: &Device, needle: &str) -> bool {
    needle.is_empty()
        || device.name().to_lowercase().contains(needle)
        || device.address.to_lowercase().contains(needle)
}

pub struct DeviceList<'a> {
    pub snapshot: &'a CacheSnapshot,
    pub visible: &'a [DeviceKey],
    pub selected: usize,
    pub focused: bool,
    pub filter: &'a str,
}

pub fn render_list(frame: &mut Frame, area: Rect, view: &DeviceList<'_>) {
    let title = if view.filter.is_empty() {
        format!(" Devices ({}) ", view.visible.len())
    } else {
        format!(
            " Devices ({}/{}) [/{}] ",
            view.visible.len(),
            view.snapshot.len(),
            view.filter
        )
    };
    let now = Utc::now();

    let rows = view.visible.iter().filter_map(|key| {
        let entry = view.snapshot.get(key)?;
        let state = &entry.state;
        let (dot, dot_style) = theme::device_status(state.online, state.stale);
        Some(
            Row::new(vec![
                Cell::from(Span::styled(dot, dot_style)),
                Cell::from(key.to_string()),
                Cell::from(entry.device.generation.to_string()),
                Cell::from(Span::styled(
                    units::fmt_power(state.telemetry.power),
                    theme::power(),
                )),
                Cell::from(units::fmt_age(state.last_fetch, now)),
            ])
            .style(theme::table_row()),
        )
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(1),
            Constraint::Min(12),
            Constraint::Length(4),
            Constraint::Length(10),
            Constraint::Length(12),
        ],
    )
    .header(Row::new(vec!["", "Name", "Gen", "Power", "Updated"]).style(theme::table_header()))
    .row_highlight_style(theme::table_selected())
    .highlight_symbol("▸ ")
    .block(widgets::panel(title, view.focused));

    let selected = (!view.visible.is_empty()).then_some(view.selected);
    let mut state = TableState::default().with_selected(selected);
    frame.render_stateful_widget(table, area, &mut state);
}
