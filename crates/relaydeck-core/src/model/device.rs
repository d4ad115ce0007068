// ── Device identity ──

use std::collections::BTreeMap;
use std::fmt;

use relaydeck_api::Generation;
use serde::{Deserialize, Serialize};

/// Stable identifier of a configured device: its unique, operator-chosen name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for DeviceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A configured device. Immutable for the lifetime of the controller;
/// everything that changes at runtime lives in [`DeviceState`](super::DeviceState).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub key: DeviceKey,
    /// `host[:port]` or a full `http(s)://` URL.
    pub address: String,
    pub generation: Generation,
    /// Whether the sync engine should hold a push subscription open.
    pub push: bool,
}

impl Device {
    /// A device with push enabled whenever its generation supports it.
    pub fn new(name: impl Into<String>, address: impl Into<String>, generation: Generation) -> Self {
        Self {
            key: DeviceKey::new(name),
            address: address.into(),
            generation,
            push: generation.supports_push(),
        }
    }

    #[must_use]
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn name(&self) -> &str {
        self.key.as_str()
    }

    /// Push is only honored when the firmware can actually deliver it.
    pub fn supports_push(&self) -> bool {
        self.push && self.generation.supports_push()
    }
}

/// Descriptive metadata read from the device configuration document.
/// Loaded on demand for the detail view; never part of the polled state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub model: Option<String>,
    pub mac: Option<String>,
    pub firmware: Option<String>,
    /// Operator-assigned names of components, keyed like `switch:0`.
    pub component_names: BTreeMap<String, String>,
}
