//! Energy tab: per-device telemetry table with fleet totals.

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Cell, Paragraph, Row, Table, TableState};

use relaydeck_core::{CacheSnapshot, DeviceKey, Telemetry};

use crate::theme;
use crate::widgets::{self, units};

/// Sum of power and energy over `keys`. Voltage and current are not additive.
pub fn totals(snapshot: &CacheSnapshot, keys: &[DeviceKey]) -> Telemetry {
    let mut total = Telemetry::default();
    for state in keys.iter().filter_map(|key| snapshot.state(key)) {
        if let Some(p) = state.telemetry.power {
            total.power = Some(total.power.unwrap_or(0.0) + p);
        }
        if let Some(e) = state.telemetry.energy {
            total.energy = Some(total.energy.unwrap_or(0.0) + e);
        }
    }
    total
}

pub fn render(
    frame: &mut Frame,
    area: Rect,
    snapshot: &CacheSnapshot,
    visible: &[DeviceKey],
    selected: usize,
    focused: bool,
) {
    let layout = Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).split(area);

    let rows = visible.iter().filter_map(|key| {
        let state = snapshot.state(key)?;
        let t = state.telemetry;
        let (dot, dot_style) = theme::device_status(state.online, state.stale);
        Some(
            Row::new(vec![
                Cell::from(Span::styled(dot, dot_style)),
                Cell::from(key.to_string()),
                Cell::from(Span::styled(units::fmt_power(t.power), theme::power())),
                Cell::from(units::fmt_voltage(t.voltage)),
                Cell::from(units::fmt_current(t.current)),
                Cell::from(units::fmt_energy(t.energy)),
            ])
            .style(theme::table_row()),
        )
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(1),
            Constraint::Min(12),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Length(11),
        ],
    )
    .header(
        Row::new(vec!["", "Device", "Power", "Voltage", "Current", "Energy"])
            .style(theme::table_header()),
    )
    .row_highlight_style(theme::table_selected())
    .highlight_symbol("▸ ")
    .block(widgets::panel(" Meters ".into(), focused));

    let mut state = TableState::default().with_selected((!visible.is_empty()).then_some(selected));
    frame.render_stateful_widget(table, layout[0], &mut state);

    let total = totals(snapshot, visible);
    let footer = Line::from(vec![
        Span::styled("  Total  ", theme::key_hint_key()),
        Span::styled(units::fmt_power(total.power), theme::power()),
        Span::styled("   ", theme::key_hint()),
        Span::styled(units::fmt_energy(total.energy), theme::table_row()),
        Span::styled(
            format!("   {}/{} online", snapshot.online_count(), snapshot.len()),
            theme::key_hint(),
        ),
    ]);
    frame.render_widget(Paragraph::new(footer), layout[1]);
}
