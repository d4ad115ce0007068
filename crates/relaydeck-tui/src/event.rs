//! Event system: crossterm reader and clocks running in a background
//! tokio task.
//!
//! Produces key and resize messages plus three clocks: `Tick` for UI
//! housekeeping, `Render` for frames, and `PollTick` for the background
//! device poll. All of them arrive on one `mpsc` channel, which the sync
//! bridge also feeds.

use std::time::Duration;

use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEventKind};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::message::Message;

/// Clock rates of the reader.
#[derive(Debug, Clone, Copy)]
pub struct Rates {
    /// `Message::Tick` interval (e.g. 250ms = 4 Hz).
    pub tick: Duration,
    /// `Message::Render` interval (e.g. 33ms ≈ 30 FPS).
    pub render: Duration,
    /// `Message::PollTick` interval. `None` disables the poll clock.
    pub poll: Option<Duration>,
}

/// Reads terminal events in a background task and sends them over a channel.
pub struct EventReader {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
}

impl EventReader {
    pub fn new(rates: Rates) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task_tx = tx.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut event_stream = EventStream::new();
            let mut tick_interval = interval(rates.tick);
            let mut render_interval = interval(rates.render);
            // The first poll tick would fire immediately, on top of the initial load.
            let mut poll_interval = rates.poll.filter(|p| !p.is_zero()).map(|p| {
                let mut i = tokio::time::interval_at(tokio::time::Instant::now() + p, p);
                i.set_missed_tick_behavior(MissedTickBehavior::Skip);
                i
            });

            loop {
                let message = tokio::select! {
                    () = task_cancel.cancelled() => break,

                    _ = tick_interval.tick() => Message::Tick,

                    _ = render_interval.tick() => Message::Render,

                    () = next_poll(poll_interval.as_mut()) => Message::PollTick,

                    Some(Ok(crossterm_event)) = event_stream.next() => {
                        match crossterm_event {
                            CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                                Message::Key(key)
                            }
                            CrosstermEvent::Resize(w, h) => Message::Resize(w, h),
                            // Ignore key release/repeat, mouse, focus and paste
                            _ => continue,
                        }
                    }
                };

                if task_tx.send(message).is_err() {
                    break;
                }
            }
        });

        Self { tx, rx, cancel }
    }

    /// Sender for other producers (the sync bridge) to join the same queue.
    pub fn sender(&self) -> mpsc::UnboundedSender<Message> {
        self.tx.clone()
    }

    /// Receive the next message. Returns `None` if the reader has stopped.
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Signal the background reader to stop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventReader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    // Don't burst ticks if we fall behind
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_poll(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
