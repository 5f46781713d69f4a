use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable 64-bit hardware address of a mesh endpoint (IEEE EUI-64).
///
/// Rendered as `0x` followed by 16 lowercase hex digits, which is also the
/// serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl FromStr for EndpointId {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u64::from_str_radix(hex, 16)
            .map(EndpointId)
            .map_err(|e| MeshError::Config(format!("invalid endpoint address '{s}': {e}")))
    }
}

impl TryFrom<String> for EndpointId {
    type Error = MeshError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EndpointId> for String {
    fn from(id: EndpointId) -> Self {
        id.to_string()
    }
}

/// Network role reported by the endpoint when it joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Coordinator,
    Router,
    EndDevice,
    #[default]
    Unknown,
}

/// How the endpoint is powered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Mains,
    Battery,
    #[default]
    Unknown,
}

/// Metadata for one networked endpoint, as reported by the endpoint directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
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
    /// Wall-clock time of the last frame received from the endpoint.
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Endpoint {
    /// An endpoint with no metadata besides its address and role.
    pub fn new(id: EndpointId, kind: DeviceKind) -> Self {
        Self {
            id,
            model: None,
            manufacturer: None,
            manufacturer_code: None,
            kind,
            power_source: PowerSource::Unknown,
            last_seen: None,
        }
    }
}

/// Announced liveness of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    /// The retained payload published for this state.
    pub fn as_payload(self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }

    pub fn is_online(self) -> bool {
        self == Availability::Online
    }
}

impl From<bool> for Availability {
    fn from(available: bool) -> Self {
        if available {
            Availability::Online
        } else {
            Availability::Offline
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_payload())
    }
}

/// Kind of inbound frame observed from an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficKind {
    /// The endpoint proactively signalled that it just came (back) online.
    Announce,
    /// Any ordinary frame (attribute report, command, read response).
    Message,
    /// The endpoint (re)joined the network.
    Joined,
    /// The endpoint left the network.
    Leave,
}

impl FromStr for TrafficKind {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "announce" => Ok(TrafficKind::Announce),
            "message" => Ok(TrafficKind::Message),
            "joined" | "join" => Ok(TrafficKind::Joined),
            "leave" => Ok(TrafficKind::Leave),
            other => Err(MeshError::Config(format!("unknown traffic kind '{other}'"))),
        }
    }
}

/// Inbound traffic notification delivered on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficEvent {
    pub endpoint: EndpointId,
    pub kind: TrafficKind,
}

/// Retained availability announcement delivered on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityUpdate {
    pub topic: String,
    pub state: Availability,
    pub retain: bool,
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "meshwatch-cli::stdin"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Traffic(TrafficEvent),
    Availability(AvailabilityUpdate),
}

// ────────────────────────────────────────────────────────────────────────────
// Settings
// ────────────────────────────────────────────────────────────────────────────

/// Global availability settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityConfig {
    /// Active probe period in seconds. `0` disables availability tracking.
    #[serde(default = "default_availability_timeout")]
    pub availability_timeout: u64,

    #[serde(default)]
    pub ping_on_startup: bool,

    #[serde(default)]
    pub refresh_on_startup: bool,

    #[serde(default = "default_true")]
    pub refresh_on_reconnect: bool,

    /// State keys re-read from an endpoint when it comes back online.
    #[serde(default = "default_refresh_keys")]
    pub reconnect_refresh_keys: Vec<String>,

    /// Identifiers or friendly names to track. When non-empty, `deny_list`
    /// is ignored.
    #[serde(default, alias = "passlist", alias = "whitelist")]
    pub allow_list: Vec<String>,

    #[serde(default, alias = "blocklist", alias = "blacklist")]
    pub deny_list: Vec<String>,
}

fn default_availability_timeout() -> u64 {
    600
}
fn default_true() -> bool {
    true
}
fn default_refresh_keys() -> Vec<String> {
    ["state", "brightness", "color", "color_temp"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            availability_timeout: default_availability_timeout(),
            ping_on_startup: false,
            refresh_on_startup: false,
            refresh_on_reconnect: true,
            reconnect_refresh_keys: default_refresh_keys(),
            allow_list: Vec::new(),
            deny_list: Vec::new(),
        }
    }
}

impl AvailabilityConfig {
    pub fn is_enabled(&self) -> bool {
        self.availability_timeout > 0
    }

    pub fn probe_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.availability_timeout)
    }
}

/// Per-endpoint boolean settings that may override the global defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    PingOnStartup,
    RefreshOnStartup,
    RefreshOnReconnect,
}

impl Setting {
    pub fn name(self) -> &'static str {
        match self {
            Setting::PingOnStartup => "ping_on_startup",
            Setting::RefreshOnStartup => "refresh_on_startup",
            Setting::RefreshOnReconnect => "refresh_on_reconnect",
        }
    }
}

/// Optional overrides stored for a single endpoint. `None` means "use the
/// global default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointOverrides {
    #[serde(default)]
    pub ping_on_startup: Option<bool>,
    #[serde(default)]
    pub refresh_on_startup: Option<bool>,
    #[serde(default)]
    pub refresh_on_reconnect: Option<bool>,
}

impl EndpointOverrides {
    pub fn get(&self, setting: Setting) -> Option<bool> {
        match setting {
            Setting::PingOnStartup => self.ping_on_startup,
            Setting::RefreshOnStartup => self.refresh_on_startup,
            Setting::RefreshOnReconnect => self.refresh_on_reconnect,
        }
    }

    pub fn set(&mut self, setting: Setting, value: Option<bool>) {
        match setting {
            Setting::PingOnStartup => self.ping_on_startup = value,
            Setting::RefreshOnStartup => self.refresh_on_startup = value,
            Setting::RefreshOnReconnect => self.refresh_on_reconnect = value,
        }
    }
}

/// Global error type spanning transport failures and configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeshError {
    #[error("Probe of {endpoint} failed: {details}")]
    ProbeFailed { endpoint: EndpointId, details: String },

    #[error("Refresh of '{key}' on {endpoint} failed: {details}")]
    RefreshFailed {
        endpoint: EndpointId,
        key: String,
        details: String,
    },

    #[error("Publish Error: {0}")]
    Publish(String),

    #[error("Event Bus Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Unknown endpoint {0}")]
    UnknownEndpoint(EndpointId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_id_renders_padded_hex() {
        let id = EndpointId(0x00158d0001a2b3c4);
        assert_eq!(id.to_string(), "0x00158d0001a2b3c4");
    }

    #[test]
    fn endpoint_id_parses_with_and_without_prefix() {
        assert_eq!("0x00158d0001a2b3c4".parse::<EndpointId>().unwrap(), EndpointId(0x00158d0001a2b3c4));
        assert_eq!("0XFF".parse::<EndpointId>().unwrap(), EndpointId(0xff));
        assert_eq!("abc".parse::<EndpointId>().unwrap(), EndpointId(0xabc));
    }

    #[test]
    fn endpoint_id_rejects_garbage() {
        let err = "kitchen_plug".parse::<EndpointId>().unwrap_err();
        assert!(matches!(err, MeshError::Config(_)));
    }

    #[test]
    fn endpoint_id_serializes_as_string() {
        let json = serde_json::to_string(&EndpointId(1)).unwrap();
        assert_eq!(json, "\"0x0000000000000001\"");
        let back: EndpointId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EndpointId(1));
    }

    #[test]
    fn availability_payloads() {
        assert_eq!(Availability::Online.as_payload(), "online");
        assert_eq!(Availability::from(false), Availability::Offline);
        assert!(!Availability::Offline.is_online());
    }

    #[test]
    fn traffic_kind_parses_case_insensitively() {
        assert_eq!("Announce".parse::<TrafficKind>().unwrap(), TrafficKind::Announce);
        assert_eq!("join".parse::<TrafficKind>().unwrap(), TrafficKind::Joined);
        assert!("reboot".parse::<TrafficKind>().is_err());
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: AvailabilityConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, AvailabilityConfig::default());
        assert_eq!(cfg.availability_timeout, 600);
        assert!(cfg.refresh_on_reconnect);
        assert_eq!(cfg.reconnect_refresh_keys.len(), 4);
    }

    #[test]
    fn config_accepts_legacy_list_names() {
        let cfg: AvailabilityConfig =
            serde_json::from_str(r#"{"passlist": ["a"], "blacklist": ["b"]}"#).unwrap();
        assert_eq!(cfg.allow_list, vec!["a".to_string()]);
        assert_eq!(cfg.deny_list, vec!["b".to_string()]);
    }

    #[test]
    fn zero_timeout_disables_tracking() {
        let cfg = AvailabilityConfig {
            availability_timeout: 0,
            ..AvailabilityConfig::default()
        };
        assert!(!cfg.is_enabled());
    }

    #[test]
    fn overrides_get_and_set() {
        let mut overrides = EndpointOverrides::default();
        assert_eq!(overrides.get(Setting::PingOnStartup), None);
        overrides.set(Setting::PingOnStartup, Some(true));
        assert_eq!(overrides.get(Setting::PingOnStartup), Some(true));
        assert_eq!(Setting::RefreshOnReconnect.name(), "refresh_on_reconnect");
    }

    #[test]
    fn endpoint_roundtrip() {
        let mut endpoint = Endpoint::new(EndpointId(42), DeviceKind::Router);
        endpoint.power_source = PowerSource::Mains;
        endpoint.model = Some("E11-N1EA".to_string());
        let json = serde_json::to_string(&endpoint).unwrap();
        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(endpoint, back);
    }

    #[test]
    fn mesh_error_display() {
        let err = MeshError::ProbeFailed {
            endpoint: EndpointId(7),
            details: "no route".to_string(),
        };
        assert!(err.to_string().contains("0x0000000000000007"));
        assert!(err.to_string().contains("no route"));
    }
}
