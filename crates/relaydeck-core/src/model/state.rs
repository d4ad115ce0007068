// ── Device runtime state ──
//
// What the cache holds per device. Values are replaced wholesale on a
// successful fetch or a full-status push; component-level pushes merge
// only the fields they carry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use relaydeck_api::Generation;
use serde::Serialize;

use crate::convert;

/// Electrical readings of one metered channel. `None` means "never reported".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Meter {
    /// Active power in watts.
    pub power: Option<f64>,
    /// Volts.
    pub voltage: Option<f64>,
    /// Amperes.
    pub current: Option<f64>,
    /// Accumulated energy in watt-hours.
    pub energy: Option<f64>,
}

impl Meter {
    /// Overwrite only the readings present in `other`.
    pub fn merge(&mut self, other: Self) {
        self.power = other.power.or(self.power);
        self.voltage = other.voltage.or(self.voltage);
        self.current = other.current.or(self.current);
        self.energy = other.energy.or(self.energy);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwitchState {
    pub on: bool,
    pub meter: Meter,
    /// Internal temperature in °C, when the relay reports one.
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LightState {
    pub on: bool,
    /// 0-100.
    pub brightness: Option<u8>,
    pub meter: Meter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverState {
    /// `open`, `closed`, `opening`, `closing`, `stopped`, ...
    pub state: String,
    /// 0 (closed) to 100 (open), when calibrated.
    pub position: Option<u8>,
    pub meter: Meter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
}

impl SensorKind {
    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    pub kind: SensorKind,
    pub value: f64,
}

/// Per-component substates, keyed by channel index (or `kind:index` for sensors).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Components {
    pub switches: BTreeMap<u8, SwitchState>,
    pub lights: BTreeMap<u8, LightState>,
    pub covers: BTreeMap<u8, CoverState>,
    /// Standalone meters (Gen1 `meters`/`emeters`, Gen2 `pm1`/`em1`/`em`).
    pub meters: BTreeMap<u8, Meter>,
    pub sensors: BTreeMap<String, SensorReading>,
}

impl Components {
    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
            && self.lights.is_empty()
            && self.covers.is_empty()
            && self.meters.is_empty()
            && self.sensors.is_empty()
    }

    fn all_meters(&self) -> impl Iterator<Item = &Meter> {
        self.switches
            .values()
            .map(|s| &s.meter)
            .chain(self.lights.values().map(|l| &l.meter))
            .chain(self.covers.values().map(|c| &c.meter))
            .chain(self.meters.values())
    }

    /// Device-level totals: power and energy are summed across channels,
    /// voltage and current come from the first channel that reports them.
    pub fn telemetry(&self) -> Telemetry {
        let sum = |pick: fn(&Meter) -> Option<f64>| {
            self.all_meters()
                .filter_map(pick)
                .fold(None, |acc: Option<f64>, v| Some(acc.unwrap_or(0.0) + v))
        };
        let first = |pick: fn(&Meter) -> Option<f64>| self.all_meters().find_map(pick);

        Telemetry {
            power: sum(|m| m.power),
            voltage: first(|m| m.voltage),
            current: first(|m| m.current),
            energy: sum(|m| m.energy),
        }
    }
}

/// Aggregated readings shown in device lists and the energy tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Telemetry {
    pub power: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub energy: Option<f64>,
}

/// Everything the cache knows about one device right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceState {
    pub online: bool,
    /// Offline, but still showing the last readings received while online.
    pub stale: bool,
    pub telemetry: Telemetry,
    pub components: Components,
    /// Time of the last successful full status (fetch or push).
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl DeviceState {
    /// Whether any reading has ever been received.
    pub fn has_data(&self) -> bool {
        self.last_fetch.is_some() || !self.components.is_empty()
    }

    /// Replace every component and the telemetry with a full status document.
    pub fn apply_full_status(
        &mut self,
        generation: Generation,
        status: &serde_json::Value,
        at: DateTime<Utc>,
    ) {
        self.install(convert::parse_status(generation, status), at);
    }

    /// Install already-parsed components as the new full status.
    pub fn install(&mut self, components: Components, at: DateTime<Utc>) {
        self.components = components;
        self.telemetry = self.components.telemetry();
        self.online = true;
        self.stale = false;
        self.last_fetch = Some(at);
        self.last_error = None;
    }

    /// Merge one component's partial payload. Returns `false` (and leaves
    /// the state untouched) for components the model does not track.
    pub fn apply_component_change(&mut self, component: &str, payload: &serde_json::Value) -> bool {
        if !convert::merge_component(&mut self.components, component, payload) {
            return false;
        }
        self.telemetry = self.components.telemetry();
        self.online = true;
        self.stale = false;
        true
    }

    /// Record a failure. Readings are kept and flagged stale. Returns
    /// `true` if anything changed.
    pub fn mark_offline(&mut self, error: impl Into<String>) -> bool {
        let error = error.into();
        if !self.online && self.last_error.as_deref() == Some(error.as_str()) {
            return false;
        }
        self.online = false;
        self.stale = self.has_data();
        self.last_error = Some(error);
        true
    }

    /// Returns `true` if anything changed.
    pub fn mark_online(&mut self) -> bool {
        if self.online && self.last_error.is_none() {
            return false;
        }
        self.online = true;
        self.stale = false;
        self.last_error = None;
        true
    }
}
