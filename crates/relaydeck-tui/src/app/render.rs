//! Frame composition: tab bar, active tab, status bar, then overlays in
//! stack order with the toast on top.

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph, Tabs};

use crate::action::Notification;
use crate::focus::{OverlayId, Panel, SearchTarget, Tab};
use crate::screens::detail::{self, DetailView};
use crate::screens::devices::{self, DeviceList};
use crate::screens::{components, energy, events};
use crate::theme;
use crate::widgets::{self, search};

use super::App;

impl App {
    pub(super) fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        let layout = Layout::vertical([
            Constraint::Length(1), // tab bar
            Constraint::Min(1),    // content
            Constraint::Length(1), // status bar
        ])
        .split(area);

        self.render_tab_bar(frame, layout[0]);
        match self.focus.active_tab() {
            Tab::Devices => self.render_devices(frame, layout[1]),
            Tab::Energy => energy::render(
                frame,
                layout[1],
                &self.snapshot,
                &self.visible,
                self.selected,
                self.focus.is_panel_focused(Panel::Meters),
            ),
            Tab::Events => events::render(
                frame,
                layout[1],
                &self.log_entries,
                self.log_selected,
                self.controller.log().is_paused(),
                self.focus.is_panel_focused(Panel::EventLog),
            ),
        }
        self.render_status_bar(frame, layout[2]);

        // Bottom of the stack first so the top overlay ends up visible.
        for id in self.focus.overlays() {
            match id {
                OverlayId::Help => render_help(frame, area),
                OverlayId::DeviceDetail => self.render_detail(frame, area),
                OverlayId::Search(SearchTarget::Devices) => {
                    search::render(frame, layout[2], &self.search, true);
                }
                // Drawn inside the detail view.
                OverlayId::Search(SearchTarget::Detail) => {}
                OverlayId::ConfirmToggle => self.render_confirm(frame, area),
            }
        }

        if let Some((notification, _)) = &self.notification {
            render_notification(frame, area, notification);
        }
    }

    fn render_tab_bar(&self, frame: &mut Frame, area: Rect) {
        let active = self.focus.active_tab();
        let titles: Vec<Line> = Tab::ALL
            .iter()
            .map(|&tab| {
                let style = if tab == active {
                    theme::tab_active()
                } else {
                    theme::tab_inactive()
                };
                Line::from(Span::styled(
                    format!(" {} {} ", tab.number(), tab.label()),
                    style,
                ))
            })
            .collect();

        let tabs = Tabs::new(titles)
            .divider(Span::styled(" ", theme::key_hint()))
            .select(active.index());
        frame.render_widget(tabs, area);
    }

    fn render_devices(&self, frame: &mut Frame, area: Rect) {
        let columns =
            Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)]).split(area);

        devices::render_list(
            frame,
            columns[0],
            &DeviceList {
                snapshot: &self.snapshot,
                visible: &self.visible,
                selected: self.selected,
                focused: self.focus.is_panel_focused(Panel::DeviceList),
                filter: self.search.value(),
            },
        );

        let rows = self
            .selected_key()
            .map(|key| self.component_rows(key))
            .unwrap_or_default();
        let title = match self.selected_key() {
            Some(key) => format!(" {key} "),
            None => " Components ".to_owned(),
        };
        let focused = self.focus.is_panel_focused(Panel::Components);
        let selected = (focused && !rows.is_empty()).then_some(self.component_selected);
        components::render(frame, columns[1], title, &rows, selected, focused);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let (settled, waves) = self.controller.load_progress();
        let progress = if self.initial_load_done || self.controller.is_loaded() {
            Span::styled(
                format!(
                    "● {}/{} online",
                    self.snapshot.online_count(),
                    self.snapshot.len()
                ),
                Style::default().fg(theme::GREEN),
            )
        } else {
            Span::styled(
                format!("◐ loading wave {settled}/{waves}"),
                Style::default().fg(theme::YELLOW),
            )
        };

        let polled = self.last_poll.map_or_else(String::new, |at| {
            format!(
                " │ polled {}",
                at.with_timezone(&chrono::Local).format("%H:%M:%S")
            )
        });

        let hints = if self.focus.has_overlay() {
            " │ Esc close  Ctrl-C quit"
        } else {
            " │ ? help  / search  r refresh  t toggle  q quit"
        };

        let line = Line::from(vec![
            Span::raw(" "),
            progress,
            Span::styled(polled, theme::key_hint()),
            Span::styled(hints, theme::key_hint()),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_detail(&self, frame: &mut Frame, area: Rect) {
        let Some(state) = &self.detail else {
            return;
        };
        let rows = self.detail_rows();
        let view = DetailView {
            key: &state.device,
            entry: self.snapshot.get(&state.device),
            info: state.info.as_ref(),
            rows: &rows,
            selected: state.selected,
            filter: &state.filter,
            searching: self.focus.top_overlay() == Some(OverlayId::Search(SearchTarget::Detail)),
        };
        detail::render(frame, area, &view);
    }

    fn render_confirm(&self, frame: &mut Frame, area: Rect) {
        let Some(pending) = &self.pending_toggle else {
            return;
        };
        let popup_area = widgets::centered(area, 44, 5);
        let inner = widgets::popup(frame, popup_area, "Confirm", theme::border_focused());

        let lines = vec![
            Line::from(Span::styled(
                format!(" {pending}"),
                Style::default().fg(theme::DIM_WHITE),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled(" y ", theme::key_hint_key()),
                Span::styled("confirm  ", theme::key_hint()),
                Span::styled("n ", theme::key_hint_key()),
                Span::styled("cancel", theme::key_hint()),
            ]),
        ];
        frame.render_widget(Paragraph::new(lines), inner);
    }
}

fn render_help(frame: &mut Frame, area: Rect) {
    let popup_area = widgets::centered(area, 56, 22);
    let inner = widgets::popup(frame, popup_area, "Keyboard Shortcuts", theme::border_focused());

    let heading =
        |text: &'static str| Line::from(Span::styled(text, Style::default().fg(theme::TEAL)));
    let key = |keys: &'static str, what: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {keys:<12}"), theme::key_hint_key()),
            Span::styled(what, theme::key_hint()),
        ])
    };

    let lines = vec![
        heading("  Navigation"),
        key("1-3", "Jump to tab"),
        key("[ ]", "Previous / next tab"),
        key("Tab S-Tab", "Cycle panels"),
        key("j k ↑ ↓", "Move selection"),
        key("g G", "First / last row"),
        Line::from(""),
        heading("  Devices"),
        key("Enter", "Device detail"),
        key("/", "Filter"),
        key("r", "Refresh selected"),
        key("R", "Refresh all"),
        key("t Space", "Toggle relay"),
        Line::from(""),
        heading("  Events"),
        key("p", "Pause / resume log"),
        key("c", "Clear log"),
        Line::from(""),
        key("Esc", "Close overlay"),
        key("q Ctrl-C", "Quit"),
    ];
    frame.render_widget(Paragraph::new(lines), inner);
}

/// Toast in the bottom-right corner, above the status bar.
fn render_notification(frame: &mut Frame, area: Rect, notification: &Notification) {
    let message_width = u16::try_from(notification.message.chars().count()).unwrap_or(u16::MAX);
    let width = message_width
        .saturating_add(6)
        .clamp(20, 60)
        .min(area.width);
    let height = 3u16.min(area.height);

    let x = area.width.saturating_sub(width + 1);
    let y = area.height.saturating_sub(height + 2);
    let toast_area = Rect::new(area.x + x, area.y + y, width, height);

    let (color, icon) = theme::notification(notification.level);

    frame.render_widget(
        Block::default().style(Style::default().bg(theme::BG_DARK)),
        toast_area,
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color));
    let inner = block.inner(toast_area);
    frame.render_widget(block, toast_area);

    let line = Line::from(vec![
        Span::styled(format!(" {icon} "), Style::default().fg(color)),
        Span::styled(
            notification.message.as_str(),
            Style::default().fg(theme::DIM_WHITE),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), inner);
}
