//! Configuration – reads `~/.meshwatch/config.toml`.
//!
//! ```toml
//! probe_timeout_ms = 2000
//!
//! [availability]
//! availability_timeout = 600
//! deny_list = ["garage_plug"]
//!
//! [[devices]]
//! address = "0x00158d0001a2b3c4"
//! friendly_name = "hall_light"
//! kind = "router"
//! power_source = "mains"
//! probe_addr = "192.168.1.40:6638"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use meshwatch_types::{
    AvailabilityConfig, DeviceKind, Endpoint, EndpointId, EndpointOverrides, PowerSource,
};
use serde::{Deserialize, Serialize};

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub availability: AvailabilityConfig,

    /// Upper bound for a single TCP probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub address: EndpointId,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub manufacturer_code: Option<u16>,
    #[serde(default)]
    pub kind: DeviceKind,
    #[serde(default)]
    pub power_source: PowerSource,
    /// `host:port` answering TCP connects while the device is reachable.
    #[serde(default)]
    pub probe_addr: Option<String>,
    #[serde(flatten)]
    pub overrides: EndpointOverrides,
}

impl DeviceConfig {
    pub fn endpoint(&self) -> Endpoint {
        let mut endpoint = Endpoint::new(self.address, self.kind);
        endpoint.model = self.model.clone();
        endpoint.manufacturer = self.manufacturer.clone();
        endpoint.manufacturer_code = self.manufacturer_code;
        endpoint.power_source = self.power_source;
        endpoint
    }
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            availability: AvailabilityConfig::default(),
            probe_timeout_ms: default_probe_timeout_ms(),
            devices: Vec::new(),
        }
    }
}

impl Config {
    /// Reject duplicate addresses and duplicate friendly names.
    pub fn validate(&self) -> Result<(), String> {
        let mut addresses = HashSet::new();
        let mut names = HashSet::new();
        for device in &self.devices {
            if !addresses.insert(device.address) {
                return Err(format!("device {} is listed twice", device.address));
            }
            if let Some(name) = &device.friendly_name
                && !names.insert(name.as_str())
            {
                return Err(format!("friendly name '{name}' is used by more than one device"));
            }
        }
        Ok(())
    }
}

/// `$MESHWATCH_CONFIG`, or `~/.meshwatch/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MESHWATCH_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".meshwatch").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    cfg.validate()?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `MESHWATCH_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MESHWATCH_AVAILABILITY_TIMEOUT` | `availability.availability_timeout` |
/// | `MESHWATCH_PROBE_TIMEOUT_MS` | `probe_timeout_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MESHWATCH_AVAILABILITY_TIMEOUT")
        && let Ok(secs) = v.trim().parse::<u64>()
    {
        cfg.availability.availability_timeout = secs;
    }
    if let Ok(v) = std::env::var("MESHWATCH_PROBE_TIMEOUT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.probe_timeout_ms = ms;
    }
}
