//! Async transport for Shelly-style relay and energy-metering devices.
//!
//! - [`Transport`] is the object-safe seam consumed by `relaydeck-core`:
//!   status/config fetches, relay control, and the push channel.
//! - [`HttpTransport`] implements it with `reqwest` (Gen1 REST and Gen2+
//!   JSON-RPC over GET) and `tokio-tungstenite` (Gen2+ notifications).
//!
//! No domain model lives here; documents are returned as raw JSON and
//! interpreted by the core crate.

pub mod client;
pub mod error;
pub mod transport;
pub mod websocket;

pub use client::HttpTransport;
pub use error::Error;
pub use transport::{EventStream, Generation, PushEvent, Transport, TransportConfig};
