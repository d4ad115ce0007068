// ── Device state storage ──

pub mod cache;

pub use cache::{CacheSnapshot, DeviceCache, DeviceEntry, FetchOutcome};
