//! Component rows of one device: relays, lights, covers, meters, sensors.
//!
//! Shared by the Devices tab's component panel and the detail overlay.

use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Cell, Paragraph, Row, Table, TableState};

use relaydeck_core::{Components, DeviceInfo};

use crate::theme;
use crate::widgets::{self, units};

/// One display row, flattened from [`Components`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRow {
    /// Component key as the device names it (`switch:0`, `temperature:0`).
    pub key: String,
    pub state: String,
    /// Relay output, for rows that can be switched.
    pub on: Option<bool>,
    /// Channel to address with a switch command.
    pub switch_channel: Option<u8>,
    pub power: Option<f64>,
}

pub fn rows(components: &Components) -> Vec<ComponentRow> {
    let mut rows = Vec::new();

    for (id, switch) in &components.switches {
        let state = match switch.temperature {
            Some(t) => format!("{}  {t:.1}°C", on_off(switch.on)),
            None => on_off(switch.on).to_owned(),
        };
        rows.push(ComponentRow {
            key: format!("switch:{id}"),
            state,
            on: Some(switch.on),
            switch_channel: Some(*id),
            power: switch.meter.power,
        });
    }
    for (id, light) in &components.lights {
        let state = match light.brightness {
            Some(b) => format!("{} {b}%", on_off(light.on)),
            None => on_off(light.on).to_owned(),
        };
        rows.push(ComponentRow {
            key: format!("light:{id}"),
            state,
            on: Some(light.on),
            switch_channel: None,
            power: light.meter.power,
        });
    }
    for (id, cover) in &components.covers {
        let state = match cover.position {
            Some(p) => format!("{} {p}%", cover.state),
            None => cover.state.clone(),
        };
        rows.push(ComponentRow {
            key: format!("cover:{id}"),
            state,
            on: None,
            switch_channel: None,
            power: cover.meter.power,
        });
    }
    for (id, meter) in &components.meters {
        rows.push(ComponentRow {
            key: format!("meter:{id}"),
            state: units::fmt_energy(meter.energy),
            on: None,
            switch_channel: None,
            power: meter.power,
        });
    }
    for (key, reading) in &components.sensors {
        rows.push(ComponentRow {
            key: key.clone(),
            state: format!("{:.1}{}", reading.value, reading.kind.unit()),
            on: None,
            switch_channel: None,
            power: None,
        });
    }
    rows
}

/// Rows whose key or operator-assigned name contains `filter` (case-insensitive).
pub fn filtered(rows: Vec<ComponentRow>, filter: &str, info: Option<&DeviceInfo>) -> Vec<ComponentRow> {
    let needle = filter.trim().to_lowercase();
    if needle.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            row.key.to_lowercase().contains(&needle)
                || info
                    .and_then(|i| i.component_names.get(&row.key))
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
        })
        .collect()
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

/// Component table with an optional selection.
pub fn render(
    frame: &mut Frame,
    area: Rect,
    title: String,
    rows: &[ComponentRow],
    selected: Option<usize>,
    focused: bool,
) {
    let block = widgets::panel(title, focused);

    if rows.is_empty() {
        let empty = Paragraph::new(Line::from(Span::styled(
            "  no components reported",
            theme::key_hint(),
        )))
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let table_rows = rows.iter().map(|row| {
        let state_style = row.on.map_or_else(theme::table_row, theme::relay);
        Row::new(vec![
            Cell::from(row.key.clone()),
            Cell::from(Span::styled(row.state.clone(), state_style)),
            Cell::from(Span::styled(units::fmt_power(row.power), theme::power())),
        ])
        .style(theme::table_row())
    });

    let table = Table::new(
        table_rows,
        [
            Constraint::Length(16),
            Constraint::Min(10),
            Constraint::Length(11),
        ],
    )
    .header(Row::new(vec!["Component", "State", "Power"]).style(theme::table_header()))
    .row_highlight_style(theme::table_selected())
    .highlight_symbol("▸ ")
    .block(block);

    let mut state = TableState::default().with_selected(selected);
    frame.render_stateful_widget(table, area, &mut state);
}
