//! Events tab: the sync engine's event log, newest first.

use chrono::Local;
use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::text::Span;
use ratatui::widgets::{Cell, Row, Table, TableState};

use relaydeck_core::LogEntry;

use crate::theme;
use crate::widgets;

pub fn render(
    frame: &mut Frame,
    area: Rect,
    entries: &[LogEntry],
    selected: usize,
    paused: bool,
    focused: bool,
) {
    let title = if paused {
        format!(" Events ({}) [paused] ", entries.len())
    } else {
        format!(" Events ({}) ", entries.len())
    };

    let rows = entries.iter().map(|entry| {
        Row::new(vec![
            Cell::from(
                entry
                    .at
                    .with_timezone(&Local)
                    .format("%H:%M:%S")
                    .to_string(),
            ),
            Cell::from(Span::styled(
                entry.level.to_string(),
                theme::log_level(entry.level),
            )),
            Cell::from(entry.device.to_string()),
            Cell::from(entry.message.clone()),
        ])
        .style(theme::table_row())
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(5),
            Constraint::Length(18),
            Constraint::Min(20),
        ],
    )
    .header(Row::new(vec!["Time", "Level", "Device", "Message"]).style(theme::table_header()))
    .row_highlight_style(theme::table_selected())
    .block(widgets::panel(title, focused));

    let mut state = TableState::default().with_selected((!entries.is_empty()).then_some(selected));
    frame.render_stateful_widget(table, area, &mut state);
}
