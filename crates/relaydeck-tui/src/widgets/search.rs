//! One-line search field backed by `tui-input`.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Position, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use tui_input::{Input, InputRequest};

use crate::theme;

/// Translate an editing key into a `tui-input` request. Keys with no
/// editing meaning (Esc, Enter, Tab, function keys) return `None`.
pub fn input_request(key: KeyEvent) -> Option<InputRequest> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    match key.code {
        KeyCode::Char('u') if ctrl => Some(InputRequest::DeleteLine),
        KeyCode::Char('w') if ctrl => Some(InputRequest::DeletePrevWord),
        KeyCode::Char('a') if ctrl => Some(InputRequest::GoToStart),
        KeyCode::Char('e') if ctrl => Some(InputRequest::GoToEnd),
        KeyCode::Char('k') if ctrl => Some(InputRequest::DeleteTillEnd),
        KeyCode::Char(_) if ctrl || alt => None,
        KeyCode::Char(c) => Some(InputRequest::InsertChar(c)),
        KeyCode::Backspace if ctrl || alt => Some(InputRequest::DeletePrevWord),
        KeyCode::Backspace => Some(InputRequest::DeletePrevChar),
        KeyCode::Delete => Some(InputRequest::DeleteNextChar),
        KeyCode::Left if ctrl => Some(InputRequest::GoToPrevWord),
        KeyCode::Left => Some(InputRequest::GoToPrevChar),
        KeyCode::Right if ctrl => Some(InputRequest::GoToNextWord),
        KeyCode::Right => Some(InputRequest::GoToNextChar),
        KeyCode::Home => Some(InputRequest::GoToStart),
        KeyCode::End => Some(InputRequest::GoToEnd),
        _ => None,
    }
}

/// Draw `/query` into `area`. While `active`, hints are shown and the
/// terminal cursor is placed inside the field.
pub fn render(frame: &mut Frame, area: Rect, input: &Input, active: bool) {
    let prefix = " / ";
    let hints = if active { "  Esc clear  Enter keep" } else { "" };
    let prefix_width = u16::try_from(prefix.chars().count()).unwrap_or(3);
    let field_width = area.width.saturating_sub(prefix_width);
    let scroll = input.visual_scroll(usize::from(field_width));

    let visible: String = input.value().chars().skip(scroll).collect();
    let line = Line::from(vec![
        Span::styled(prefix, Style::default().fg(theme::AMBER)),
        Span::styled(visible, Style::default().fg(theme::TEAL)),
        Span::styled(hints, theme::key_hint()),
    ]);
    frame.render_widget(Paragraph::new(line), area);

    if active {
        let offset = input.visual_cursor().saturating_sub(scroll);
        let offset = u16::try_from(offset).unwrap_or(u16::MAX);
        let x = area.x + prefix_width + offset.min(field_width);
        frame.set_cursor_position(Position::new(x, area.y));
    }
}
