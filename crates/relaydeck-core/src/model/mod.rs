// ── Domain model ──
//
// Canonical device types shared by the cache, the sync tasks, and the TUI.

pub mod device;
pub mod state;

pub use device::{Device, DeviceInfo, DeviceKey};
pub use state::{
    Components, CoverState, DeviceState, LightState, Meter, SensorKind, SensorReading,
    SwitchState, Telemetry,
};
