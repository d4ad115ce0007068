//! Push notification stream for RPC-generation devices.
//!
//! Connects to a device's `/rpc` WebSocket endpoint, announces the client
//! with a `Shelly.GetStatus` request (devices only notify peers that have
//! sent at least one frame), then yields parsed [`PushEvent`]s until the
//! connection drops.
//!
//! Unlike a reconnecting event bus, a stream returned here ends for good
//! on disconnect: the final item is always [`PushEvent::Offline`]. Deciding
//! when to reconnect belongs to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//!
//! let mut events = relaydeck_api::websocket::subscribe("192.168.1.40", "relaydeck").await?;
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! ```

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::Error;
use crate::transport::{EventStream, PushEvent};

/// Request id of the greeting frame; its response carries a full status.
const GREETING_ID: u64 = 1;

/// Open the push channel of the device at `address`.
pub async fn subscribe(address: &str, client_id: &str) -> Result<EventStream, Error> {
    let url = ws_url(address)?;
    tracing::info!(url = %url, "Connecting to device WebSocket");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    let greeting = serde_json::json!({
        "id": GREETING_ID,
        "src": client_id,
        "method": "Shelly.GetStatus",
    });
    write
        .send(Message::Text(greeting.to_string().into()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::debug!(url = %url, "Device WebSocket connected");

    let stream = async_stream::stream! {
        // The sink must outlive the read loop or the connection closes.
        let _write = write;
        yield PushEvent::Online;

        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    for event in parse_frame(text.as_str()) {
                        yield event;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map_or_else(
                        || "closed by device".to_owned(),
                        |cf| format!("closed by device (code {}): {}", u16::from(cf.code), cf.reason),
                    );
                    yield PushEvent::Offline { reason };
                    break;
                }
                Some(Ok(_)) => {
                    // Binary, Ping, Pong, Frame -- tungstenite answers pings itself
                }
                Some(Err(e)) => {
                    yield PushEvent::Offline { reason: e.to_string() };
                    break;
                }
                None => {
                    yield PushEvent::Offline { reason: "stream ended".to_owned() };
                    break;
                }
            }
        }
    };

    Ok(Box::pin(stream))
}

/// `ws://host[:port]/rpc` for a bare address, or the scheme-swapped URL
/// when the address already carries `http(s)://`.
pub(crate) fn ws_url(address: &str) -> Result<Url, Error> {
    let address = address.trim().trim_end_matches('/');
    let raw = if let Some(rest) = address.strip_prefix("https://") {
        format!("wss://{rest}/rpc")
    } else if let Some(rest) = address.strip_prefix("http://") {
        format!("ws://{rest}/rpc")
    } else if address.contains("://") {
        format!("{address}/rpc")
    } else {
        format!("ws://{address}/rpc")
    };
    Url::parse(&raw).map_err(|e| Error::WebSocketConnect(format!("{e}: {raw}")))
}

// ── Frame parsing ────────────────────────────────────────────────────

/// JSON-RPC frame as sent by the device. Notifications carry `method` +
/// `params`; responses carry `id` + `result` or `error`.
#[derive(Debug, Deserialize)]
struct RpcFrame {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<serde_json::Value>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Translate one text frame into zero or more push events.
pub(crate) fn parse_frame(text: &str) -> Vec<PushEvent> {
    let frame: RpcFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse device frame");
            return Vec::new();
        }
    };

    if let Some(error) = frame.error {
        tracing::debug!(error = %error, "Device returned RPC error");
        return Vec::new();
    }

    match frame.method.as_deref() {
        Some("NotifyStatus") => frame
            .params
            .and_then(|p| match p {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .map(|map| {
                map.into_iter()
                    .filter(|(key, _)| key != "ts")
                    .map(|(component, payload)| PushEvent::StatusChange { component, payload })
                    .collect()
            })
            .unwrap_or_default(),
        Some("NotifyFullStatus") => frame.params.map(full_status).unwrap_or_default(),
        Some(other) => {
            tracing::trace!(method = other, "Ignoring device notification");
            Vec::new()
        }
        None if frame.id == Some(GREETING_ID) => frame.result.map(full_status).unwrap_or_default(),
        None => Vec::new(),
    }
}

/// A full status replaces every component, so anything but an object is
/// dropped rather than wiping the device.
fn full_status(mut payload: serde_json::Value) -> Vec<PushEvent> {
    let Some(map) = payload.as_object_mut() else {
        tracing::debug!(payload = %payload, "Full status is not an object, skipping");
        return Vec::new();
    };
    map.remove("ts");
    vec![PushEvent::FullStatus { payload }]
}

// ── Tests ────────────────────────────────────────────────────────────
