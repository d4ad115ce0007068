//! Inbound messages of the orchestrator loop. Everything that changes UI
//! state arrives as one of these, one at a time.

use crossterm::event::KeyEvent;

use relaydeck_core::SyncEvent;

#[derive(Debug, Clone)]
pub enum Message {
    /// A key was pressed.
    Key(KeyEvent),
    /// A background sync task reported progress or a result.
    Sync(SyncEvent),
    /// Periodic UI housekeeping (toast expiry).
    Tick,
    /// Background poll clock.
    PollTick,
    /// Frame clock.
    Render,
    /// Terminal was resized to (cols, rows).
    Resize(u16, u16),
}
