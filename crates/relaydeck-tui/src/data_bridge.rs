//! Data bridge: forwards the controller's [`SyncEvent`]s into the
//! orchestrator's message queue.
//!
//! Background sync tasks never touch UI state. Their results travel from
//! the controller's event channel through this task and reach the app as
//! [`Message::Sync`], processed one at a time like key presses.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use relaydeck_core::SyncEvent;

use crate::message::Message;

/// Spawn the bridge. It ends on cancellation, when the controller drops its
/// sender, or when the app stops receiving.
pub fn spawn_data_bridge(
    mut events: mpsc::UnboundedReceiver<SyncEvent>,
    message_tx: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                event = events.recv() => {
                    let Some(event) = event else { break };
                    if message_tx.send(Message::Sync(event)).is_err() {
                        break;
                    }
                }
            }
        }
        debug!("data bridge shut down");
    })
}
