//! Configuration for relaydeck.
//!
//! A TOML file lists the devices to watch and tunes the sync engine;
//! `RELAYDECK_`-prefixed environment variables override file values
//! (nested keys use `__`, e.g. `RELAYDECK_SYNC__BATCH_SIZE=10`). The
//! result is validated and translated into `relaydeck_core` types.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use relaydeck_core::{Device, Generation, SyncConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// `[sync]` table. Durations are plain integers with their unit in the name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    pub batch_size: usize,
    pub wave_pause_ms: u64,
    pub fetch_timeout_secs: u64,
    pub fetch_all_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
    /// 0 disables background polling.
    pub poll_interval_secs: u64,
    pub refresh_debounce_ms: u64,
    /// 0 disables the circuit breaker.
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,
    pub log_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let d = SyncConfig::default();
        Self {
            batch_size: d.batch_size,
            wave_pause_ms: millis(d.wave_pause),
            fetch_timeout_secs: d.fetch_timeout.as_secs(),
            fetch_all_timeout_secs: d.fetch_all_timeout.as_secs(),
            max_concurrent_fetches: d.max_concurrent_fetches,
            poll_interval_secs: d.poll_interval.as_secs(),
            refresh_debounce_ms: millis(d.refresh_debounce),
            breaker_failure_threshold: d.breaker_failure_threshold,
            breaker_cooldown_secs: d.breaker_cooldown.as_secs(),
            log_capacity: d.log_capacity,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Unique display name; also the device's key.
    pub name: String,

    /// `host[:port]` or a full `http(s)://` URL.
    pub address: String,

    #[serde(default)]
    pub generation: Generation,

    /// Hold a push subscription open. Defaults to on for RPC generations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<bool>,
}

impl Config {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.batch_size == 0 {
            return Err(invalid("sync.batch_size", "must be at least 1"));
        }
        if self.sync.max_concurrent_fetches == 0 {
            return Err(invalid("sync.max_concurrent_fetches", "must be at least 1"));
        }
        if self.sync.fetch_timeout_secs == 0 {
            return Err(invalid("sync.fetch_timeout_secs", "must be at least 1"));
        }
        if self.sync.log_capacity == 0 {
            return Err(invalid("sync.log_capacity", "must be at least 1"));
        }

        let mut seen = HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            let name = device.name.trim();
            if name.is_empty() {
                return Err(invalid(format!("devices[{i}].name"), "must not be empty"));
            }
            if device.address.trim().is_empty() {
                return Err(invalid(
                    format!("devices[{i}].address"),
                    format!("device '{name}' has no address"),
                ));
            }
            if !seen.insert(name) {
                return Err(invalid(
                    format!("devices[{i}].name"),
                    format!("duplicate device name '{name}'"),
                ));
            }
        }
        Ok(())
    }

    /// Engine settings in runtime form.
    pub fn sync_config(&self) -> SyncConfig {
        let s = &self.sync;
        SyncConfig {
            batch_size: s.batch_size,
            wave_pause: Duration::from_millis(s.wave_pause_ms),
            fetch_timeout: Duration::from_secs(s.fetch_timeout_secs),
            fetch_all_timeout: Duration::from_secs(s.fetch_all_timeout_secs),
            max_concurrent_fetches: s.max_concurrent_fetches,
            poll_interval: Duration::from_secs(s.poll_interval_secs),
            refresh_debounce: Duration::from_millis(s.refresh_debounce_ms),
            breaker_failure_threshold: s.breaker_failure_threshold,
            breaker_cooldown: Duration::from_secs(s.breaker_cooldown_secs),
            log_capacity: s.log_capacity,
        }
    }

    /// Configured devices in file order.
    pub fn devices(&self) -> Vec<Device> {
        self.devices
            .iter()
            .map(|d| {
                let device = Device::new(d.name.trim(), d.address.trim(), d.generation);
                match d.push {
                    Some(push) => device.with_push(push),
                    None => device,
                }
            })
            .collect()
    }

    /// A starter file with one example device.
    pub fn example() -> Self {
        Self {
            sync: SyncSettings::default(),
            devices: vec![DeviceConfig {
                name: "kitchen-plug".into(),
                address: "192.168.1.40".into(),
                generation: Generation::Gen2,
                push: None,
            }],
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "relaydeck", "relaydeck").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("relaydeck");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the config from the platform path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and validate the config from `path` + environment. A missing file
/// yields the defaults (and no devices).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RELAYDECK_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Write `cfg` to `path`, refusing to overwrite an existing file.
pub fn save_new_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
