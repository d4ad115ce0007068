// Transport seam between the sync engine and the devices.
//
// `Transport` is the object-safe interface the core consumes; the
// reqwest/tungstenite implementation lives in `client` and `websocket`.
// `TransportConfig` holds the shared HTTP client settings.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Device firmware generation. Selects the HTTP dialect and whether a
/// push channel exists.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Generation {
    /// Classic REST firmware (`/status`, `/settings`, `/relay/N`).
    Gen1,
    /// JSON-RPC firmware with WebSocket notifications.
    #[default]
    Gen2,
    /// Same RPC surface as Gen2.
    Gen3,
}

impl Generation {
    /// Whether this generation speaks the `/rpc` JSON-RPC dialect.
    pub fn uses_rpc(self) -> bool {
        !matches!(self, Self::Gen1)
    }

    /// Whether the device can push notifications over a WebSocket.
    pub fn supports_push(self) -> bool {
        self.uses_rpc()
    }
}

/// A single notification received from a device's push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Incremental change of one component (e.g. `switch:0`). The payload
    /// carries only the fields that changed.
    StatusChange {
        component: String,
        payload: serde_json::Value,
    },
    /// Complete status dump, same shape as `fetch_status`.
    FullStatus { payload: serde_json::Value },
    /// The channel is established.
    Online,
    /// The channel dropped. Always the last item of a stream.
    Offline { reason: String },
}

/// Stream of push events for one device. Ends when the connection closes.
pub type EventStream = BoxStream<'static, PushEvent>;

/// Everything the sync engine needs from the outside world.
///
/// Implementations must be cheap to share (`Arc<dyn Transport>`) and every
/// call must be cancel-safe: dropping a returned future aborts the request.
pub trait Transport: Send + Sync {
    /// Fetch the full status document of a device.
    fn fetch_status<'a>(
        &'a self,
        address: &'a str,
        generation: Generation,
    ) -> BoxFuture<'a, Result<serde_json::Value, Error>>;

    /// Fetch the configuration document of a device.
    fn fetch_config<'a>(
        &'a self,
        address: &'a str,
        generation: Generation,
    ) -> BoxFuture<'a, Result<serde_json::Value, Error>>;

    /// Open the push channel of a device.
    fn subscribe<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<EventStream, Error>>;

    /// Switch one relay channel on or off.
    fn set_switch<'a>(
        &'a self,
        address: &'a str,
        generation: Generation,
        channel: u8,
        on: bool,
    ) -> BoxFuture<'a, Result<(), Error>>;
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout applied by reqwest.
    pub timeout: Duration,
    /// TCP connect timeout. Embedded devices either answer fast or not at all.
    pub connect_timeout: Duration,
    /// `src` identifier announced on RPC push channels.
    pub client_id: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            client_id: "relaydeck".into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(concat!("relaydeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Transport)
    }
}
