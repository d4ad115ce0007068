//! Terminal session owned by the app for the lifetime of the UI.
//!
//! The session is the only place that touches raw mode and the alternate
//! screen. The screen is handed back exactly once: by [`Session::close`]
//! after the sync engine has stopped, by `Drop` on an early return, or by
//! the panic hook.

use std::io::{Stdout, stdout};
use std::sync::atomic::{AtomicBool, Ordering};

use color_eyre::eyre::{Result, WrapErr};
use crossterm::{
    cursor, execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::debug;

use relaydeck_core::Controller;

/// Set while the alternate screen is up; shared with the panic hook.
static SCREEN_TAKEN: AtomicBool = AtomicBool::new(false);

pub struct Session {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Session {
    /// Switch to raw mode and the alternate screen.
    pub fn open() -> Result<Self> {
        let mut session = Self {
            terminal: Terminal::new(CrosstermBackend::new(stdout()))?,
        };

        // From here on, an error drops `session` and restores.
        terminal::enable_raw_mode().wrap_err("cannot enable raw mode")?;
        SCREEN_TAKEN.store(true, Ordering::SeqCst);
        execute!(stdout(), EnterAlternateScreen, cursor::Hide)?;
        session.terminal.clear()?;

        let size = session.terminal.size()?;
        debug!(width = size.width, height = size.height, "terminal session opened");
        Ok(session)
    }

    pub fn terminal(&mut self) -> &mut Terminal<CrosstermBackend<Stdout>> {
        &mut self.terminal
    }

    /// Stop the sync engine, then give the screen back. Log lines and
    /// errors from the shutdown land while the UI is still up, never on
    /// the restored shell.
    pub async fn close(self, controller: &Controller) {
        controller.shutdown().await;
        drop(self);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        release_screen();
    }
}

/// Leave the alternate screen if we still hold it. Idempotent.
fn release_screen() {
    if !SCREEN_TAKEN.swap(false, Ordering::SeqCst) {
        return;
    }
    let _ = execute!(stdout(), cursor::Show, LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();
}

/// color-eyre report and panic hooks. The panic hook releases the screen
/// first so the report is readable. Install before [`Session::open`].
pub fn install_hooks() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
        .display_env_section(false)
        .panic_section("relaydeck crashed; run with -vv and check the log file")
        .into_hooks();
    eyre_hook.install()?;

    let panic_hook = panic_hook.into_panic_hook();
    std::panic::set_hook(Box::new(move |info| {
        release_screen();
        panic_hook(info);
    }));
    Ok(())
}
