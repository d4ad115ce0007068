// ── Device document conversions ──
//
// Bridges raw status/config JSON into the canonical `model` types. Gen1
// firmware reports arrays (`relays`, `meters`, ...); RPC firmware reports
// one object per component under `kind:index` keys. Unknown components
// and malformed fields are skipped, never fatal.

use serde_json::Value;

use relaydeck_api::Generation;

use crate::model::{
    Components, CoverState, DeviceInfo, LightState, Meter, SensorKind, SensorReading,
};

// ── Helpers ────────────────────────────────────────────────────────

fn f64_at(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn percent_at(value: &Value, key: &str) -> Option<u8> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| u8::try_from(v.min(100)).unwrap_or(100))
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Split `switch:0` into `("switch", 0)`.
fn split_component(component: &str) -> Option<(&str, u8)> {
    let (kind, index) = component.split_once(':')?;
    Some((kind, index.parse().ok()?))
}

// ── RPC generations ────────────────────────────────────────────────

fn rpc_meter(payload: &Value) -> Meter {
    Meter {
        power: f64_at(payload, "apower").or_else(|| f64_at(payload, "act_power")),
        voltage: f64_at(payload, "voltage"),
        current: f64_at(payload, "current"),
        energy: payload.pointer("/aenergy/total").and_then(Value::as_f64),
    }
}

/// Three-phase meters report totals under their own names.
fn rpc_em_meter(payload: &Value) -> Meter {
    Meter {
        power: f64_at(payload, "total_act_power"),
        voltage: f64_at(payload, "a_voltage"),
        current: f64_at(payload, "total_current"),
        energy: None,
    }
}

/// Merge one RPC component payload into `components`. Fields missing
/// from the payload keep their previous values. Returns `false` for
/// components the model does not track (`sys`, `wifi`, `ble`, ...).
pub fn merge_component(components: &mut Components, component: &str, payload: &Value) -> bool {
    let Some((kind, index)) = split_component(component) else {
        return false;
    };

    match kind {
        "switch" => {
            let switch = components.switches.entry(index).or_default();
            if let Some(on) = payload.get("output").and_then(Value::as_bool) {
                switch.on = on;
            }
            switch.meter.merge(rpc_meter(payload));
            if let Some(t) = payload.pointer("/temperature/tC").and_then(Value::as_f64) {
                switch.temperature = Some(t);
            }
        }
        "light" => {
            let light = components.lights.entry(index).or_default();
            if let Some(on) = payload.get("output").and_then(Value::as_bool) {
                light.on = on;
            }
            if let Some(b) = percent_at(payload, "brightness") {
                light.brightness = Some(b);
            }
            light.meter.merge(rpc_meter(payload));
        }
        "cover" => {
            let cover = components.covers.entry(index).or_default();
            if let Some(state) = payload.get("state").and_then(Value::as_str) {
                state.clone_into(&mut cover.state);
            }
            if let Some(pos) = percent_at(payload, "current_pos") {
                cover.position = Some(pos);
            }
            cover.meter.merge(rpc_meter(payload));
        }
        "pm1" | "em1" => {
            components
                .meters
                .entry(index)
                .or_default()
                .merge(rpc_meter(payload));
        }
        "em" => {
            components
                .meters
                .entry(index)
                .or_default()
                .merge(rpc_em_meter(payload));
        }
        "temperature" => {
            let Some(value) = f64_at(payload, "tC") else {
                return false;
            };
            components.sensors.insert(
                component.to_owned(),
                SensorReading {
                    kind: SensorKind::Temperature,
                    value,
                },
            );
        }
        "humidity" => {
            let Some(value) = f64_at(payload, "rh") else {
                return false;
            };
            components.sensors.insert(
                component.to_owned(),
                SensorReading {
                    kind: SensorKind::Humidity,
                    value,
                },
            );
        }
        _ => return false,
    }
    true
}

fn parse_rpc_status(status: &Value) -> Components {
    let mut components = Components::default();
    if let Some(map) = status.as_object() {
        for (component, payload) in map {
            merge_component(&mut components, component, payload);
        }
    }
    components
}

// ── Gen1 ───────────────────────────────────────────────────────────

fn indexed<'a>(status: &'a Value, key: &str) -> impl Iterator<Item = (u8, &'a Value)> {
    status
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(i, v)| Some((u8::try_from(i).ok()?, v)))
}

fn parse_gen1_status(status: &Value) -> Components {
    let mut components = Components::default();

    for (i, relay) in indexed(status, "relays") {
        let switch = components.switches.entry(i).or_default();
        switch.on = relay.get("ison").and_then(Value::as_bool).unwrap_or(false);
    }

    // `meters[].total` is in watt-minutes.
    for (i, meter) in indexed(status, "meters") {
        components.meters.insert(
            i,
            Meter {
                power: f64_at(meter, "power"),
                voltage: None,
                current: None,
                energy: f64_at(meter, "total").map(|wm| wm / 60.0),
            },
        );
    }

    // `emeters[].total` is already in watt-hours.
    for (i, emeter) in indexed(status, "emeters") {
        components.meters.insert(
            i,
            Meter {
                power: f64_at(emeter, "power"),
                voltage: f64_at(emeter, "voltage"),
                current: f64_at(emeter, "current"),
                energy: f64_at(emeter, "total"),
            },
        );
    }

    for (i, light) in indexed(status, "lights") {
        components.lights.insert(
            i,
            LightState {
                on: light.get("ison").and_then(Value::as_bool).unwrap_or(false),
                brightness: percent_at(light, "brightness"),
                meter: Meter::default(),
            },
        );
    }

    for (i, roller) in indexed(status, "rollers") {
        components.covers.insert(
            i,
            CoverState {
                state: roller
                    .get("state")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_owned(),
                position: percent_at(roller, "current_pos"),
                meter: Meter {
                    power: f64_at(roller, "power"),
                    ..Meter::default()
                },
            },
        );
    }

    if let Some(t) = status.pointer("/tmp/tC").and_then(Value::as_f64) {
        components.sensors.insert(
            "temperature:0".into(),
            SensorReading {
                kind: SensorKind::Temperature,
                value: t,
            },
        );
    }

    components
}

// ── Public entry points ────────────────────────────────────────────

/// Convert a full status document into a fresh set of components.
pub fn parse_status(generation: Generation, status: &Value) -> Components {
    if generation.uses_rpc() {
        parse_rpc_status(status)
    } else {
        parse_gen1_status(status)
    }
}

/// Extract descriptive metadata from a configuration document.
pub fn parse_device_info(generation: Generation, config: &Value) -> DeviceInfo {
    let mut info = DeviceInfo::default();

    if generation.uses_rpc() {
        info.name = str_at(config, "/sys/device/name").map(str::to_owned);
        info.mac = str_at(config, "/sys/device/mac").map(str::to_owned);
        info.firmware = str_at(config, "/sys/device/fw_id").map(str::to_owned);
        if let Some(map) = config.as_object() {
            for (component, section) in map {
                if let Some(name) = section.get("name").and_then(Value::as_str) {
                    info.component_names
                        .insert(component.clone(), name.to_owned());
                }
            }
        }
    } else {
        info.name = str_at(config, "/name").map(str::to_owned);
        info.model = str_at(config, "/device/type").map(str::to_owned);
        info.mac = str_at(config, "/device/mac").map(str::to_owned);
        info.firmware = str_at(config, "/fw").map(str::to_owned);
        for (i, relay) in indexed(config, "relays") {
            if let Some(name) = relay.get("name").and_then(Value::as_str) {
                info.component_names
                    .insert(format!("switch:{i}"), name.to_owned());
            }
        }
    }

    info
}
