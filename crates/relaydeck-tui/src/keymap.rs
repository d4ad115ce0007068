//! Context map: translates a key event into an [`Action`] for the current
//! focus context.
//!
//! [`resolve`] is a pure lookup. Precedence, first match wins:
//!
//! 1. `Ctrl+C` is [`Action::ForceQuit`] everywhere.
//! 2. [`Mode::Input`] forwards every other key raw to the text field.
//! 3. [`Mode::Modal`] maps confirm/cancel keys; everything else is raw.
//! 4. [`Mode::Overlay`] maps `Esc` to close, then asks the top overlay.
//! 5. [`Mode::Normal`] uses global keys, then the active tab's keys.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::action::Action;
use crate::focus::{FocusState, Mode, OverlayId, Panel, SearchTarget, Tab};

/// Everything the keymap looks at besides the key itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub mode: Mode,
    pub tab: Tab,
    pub panel: Panel,
    pub overlay: Option<OverlayId>,
}

impl Context {
    pub fn from_focus(focus: &FocusState) -> Self {
        Self {
            mode: focus.mode(),
            tab: focus.active_tab(),
            panel: focus.active_panel(),
            overlay: focus.top_overlay(),
        }
    }
}

/// Outcome of a key lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The key means something in this context.
    Action(Action),
    /// The key belongs to the surface on top, untranslated.
    Raw(KeyEvent),
    /// Nothing is bound; the key is dropped.
    Unbound,
}

#[cfg(test)]
impl Route {
    fn action(&self) -> Option<Action> {
        match self {
            Self::Action(action) => Some(*action),
            Self::Raw(_) | Self::Unbound => None,
        }
    }
}

/// Look up `key` in `ctx`.
pub fn resolve(ctx: &Context, key: KeyEvent) -> Route {
    if is_ctrl_c(key) {
        return Route::Action(Action::ForceQuit);
    }

    match ctx.mode {
        Mode::Input => Route::Raw(key),
        Mode::Modal => modal(key).map_or(Route::Raw(key), Route::Action),
        Mode::Overlay => {
            if key.code == KeyCode::Esc {
                return Route::Action(Action::CloseOverlay);
            }
            overlay(ctx.overlay, key).map_or(Route::Unbound, Route::Action)
        }
        Mode::Normal => normal(ctx, key).map_or(Route::Unbound, Route::Action),
    }
}

/// Shorthand for tests that only care about the action.
#[cfg(test)]
fn match_key(ctx: &Context, key: KeyEvent) -> Option<Action> {
    resolve(ctx, key).action()
}

fn is_ctrl_c(key: KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c' | 'C'))
}

/// Shift is part of the character (`R`, `?`), so only Ctrl and Alt disqualify.
fn plain(key: KeyEvent) -> bool {
    !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
}

// ── Per-mode tables ──────────────────────────────────────────────────

fn modal(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('y' | 'Y') | KeyCode::Enter if plain(key) => Some(Action::Confirm),
        KeyCode::Char('n' | 'N') if plain(key) => Some(Action::Cancel),
        KeyCode::Esc => Some(Action::Cancel),
        _ => None,
    }
}

fn overlay(top: Option<OverlayId>, key: KeyEvent) -> Option<Action> {
    if !plain(key) {
        return None;
    }
    match top? {
        OverlayId::Help => match key.code {
            KeyCode::Char('?' | 'q') => Some(Action::CloseOverlay),
            _ => None,
        },
        OverlayId::DeviceDetail => match key.code {
            KeyCode::Char('q') => Some(Action::CloseOverlay),
            KeyCode::Char('/') => Some(Action::OpenSearch(SearchTarget::Detail)),
            KeyCode::Char('?') => Some(Action::OpenHelp),
            KeyCode::Char('r') => Some(Action::RefreshSelected),
            KeyCode::Char('t' | ' ') => Some(Action::ToggleSelected),
            KeyCode::Char(c @ '1'..='3') => tab_key(c),
            code => selection(code),
        },
        OverlayId::Search(_) | OverlayId::ConfirmToggle => None,
    }
}

fn normal(ctx: &Context, key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::BackTab {
        return Some(Action::PrevPanel);
    }
    if !plain(key) {
        return None;
    }

    let global = match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('?') => Some(Action::OpenHelp),
        KeyCode::Char('R') => Some(Action::RefreshAll),
        KeyCode::Char('p') => Some(Action::ToggleLogPause),
        KeyCode::Char('c') => Some(Action::ClearLog),
        KeyCode::Char('[') => Some(Action::PrevTab),
        KeyCode::Char(']') => Some(Action::NextTab),
        KeyCode::Char(c @ '1'..='3') => tab_key(c),
        KeyCode::Tab => Some(Action::NextPanel),
        code => selection(code),
    };
    if global.is_some() {
        return global;
    }

    match (ctx.tab, key.code) {
        (Tab::Devices | Tab::Energy, KeyCode::Char('/')) => {
            Some(Action::OpenSearch(SearchTarget::Devices))
        }
        (Tab::Devices | Tab::Energy, KeyCode::Enter) => Some(Action::OpenDetail),
        (Tab::Devices | Tab::Energy, KeyCode::Char('r')) => Some(Action::RefreshSelected),
        (Tab::Devices, KeyCode::Char('t' | ' ')) => Some(Action::ToggleSelected),
        _ => None,
    }
}

fn tab_key(c: char) -> Option<Action> {
    let n = c.to_digit(10).and_then(|d| u8::try_from(d).ok())?;
    Tab::from_number(n).map(Action::SwitchTab)
}

fn selection(code: KeyCode) -> Option<Action> {
    match code {
        KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrev),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::SelectFirst),
        KeyCode::Char('G') | KeyCode::End => Some(Action::SelectLast),
        _ => None,
    }
}
