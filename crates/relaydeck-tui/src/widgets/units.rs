//! Human-readable electrical units and ages.

use std::time::Duration;

use chrono::{DateTime, Utc};

const MISSING: &str = "—";

/// Watts, switching to kW at 1000 (e.g., "150.0 W", "2.35 kW").
pub fn fmt_power(watts: Option<f64>) -> String {
    match watts {
        Some(w) if w.abs() >= 1_000.0 => format!("{:.2} kW", w / 1_000.0),
        Some(w) => format!("{w:.1} W"),
        None => MISSING.into(),
    }
}

pub fn fmt_voltage(volts: Option<f64>) -> String {
    volts.map_or_else(|| MISSING.into(), |v| format!("{v:.1} V"))
}

pub fn fmt_current(amps: Option<f64>) -> String {
    amps.map_or_else(|| MISSING.into(), |a| format!("{a:.2} A"))
}

/// Watt-hours, switching to kWh at 1000 (e.g., "820 Wh", "12.40 kWh").
pub fn fmt_energy(wh: Option<f64>) -> String {
    match wh {
        Some(e) if e.abs() >= 1_000.0 => format!("{:.2} kWh", e / 1_000.0),
        Some(e) => format!("{e:.0} Wh"),
        None => MISSING.into(),
    }
}

/// Time since `at`, rounded to whole seconds ("12s ago", "3m 4s ago").
pub fn fmt_age(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "never".into();
    };
    let elapsed = (now - at).to_std().unwrap_or_default();
    if elapsed < Duration::from_secs(1) {
        return "just now".into();
    }
    let rounded = Duration::from_secs(elapsed.as_secs());
    format!("{} ago", humantime::format_duration(rounded))
}
