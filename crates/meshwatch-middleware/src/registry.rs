//! [`FleetRegistry`] – in-memory endpoint directory and settings store.
//!
//! The registry keeps one [`DeviceEntry`] per endpoint (metadata, friendly
//! name, per-endpoint overrides) plus the global [`AvailabilityConfig`].  It
//! implements both [`EndpointDirectory`] and [`SettingsStore`], so a single
//! shared instance can back the engine while the host keeps mutating it
//! (devices joining or leaving, `last_seen` updates, setting changes).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use meshwatch_types::{AvailabilityConfig, Endpoint, EndpointId, EndpointOverrides, Setting};

use crate::transport::{EndpointDirectory, SettingsStore};

/// Everything the registry knows about one endpoint.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub endpoint: Endpoint,
    pub friendly_name: Option<String>,
    pub overrides: EndpointOverrides,
}

struct Fleet {
    config: AvailabilityConfig,
    devices: HashMap<EndpointId, DeviceEntry>,
}

/// Shared, thread-safe endpoint directory and settings store.
///
/// # Example
///
/// ```
/// use meshwatch_middleware::registry::FleetRegistry;
/// use meshwatch_middleware::transport::{EndpointDirectory, SettingsStore};
/// use meshwatch_types::{AvailabilityConfig, DeviceKind, Endpoint, EndpointId};
///
/// let fleet = FleetRegistry::new(AvailabilityConfig::default());
/// fleet.register(Endpoint::new(EndpointId(1), DeviceKind::Router), Some("hall_plug".into()));
///
/// assert_eq!(fleet.display_name(EndpointId(1)), "hall_plug");
/// assert!(fleet.resolve(EndpointId(2)).is_none());
/// ```
pub struct FleetRegistry {
    inner: RwLock<Fleet>,
}

impl FleetRegistry {
    pub fn new(config: AvailabilityConfig) -> Self {
        Self {
            inner: RwLock::new(Fleet {
                config,
                devices: HashMap::new(),
            }),
        }
    }

    /// Register an endpoint.  Any previous entry with the same id is replaced,
    /// overrides included.
    pub fn register(&self, endpoint: Endpoint, friendly_name: Option<String>) {
        self.write().devices.insert(
            endpoint.id,
            DeviceEntry {
                endpoint,
                friendly_name,
                overrides: EndpointOverrides::default(),
            },
        );
    }

    /// Remove an endpoint, returning its last known metadata.
    pub fn remove(&self, id: EndpointId) -> Option<Endpoint> {
        self.write().devices.remove(&id).map(|entry| entry.endpoint)
    }

    /// Replace the metadata of a registered endpoint, keeping its name and
    /// overrides.  Returns `false` for unknown endpoints.
    pub fn update(&self, endpoint: Endpoint) -> bool {
        match self.write().devices.get_mut(&endpoint.id) {
            Some(entry) => {
                entry.endpoint = endpoint;
                true
            }
            None => false,
        }
    }

    /// Record that a frame was received from `id` at `at`.
    pub fn mark_seen(&self, id: EndpointId, at: DateTime<Utc>) -> bool {
        match self.write().devices.get_mut(&id) {
            Some(entry) => {
                entry.endpoint.last_seen = Some(at);
                true
            }
            None => false,
        }
    }

    /// Set (or clear, with `None`) a per-endpoint override.
    pub fn set_override(&self, id: EndpointId, setting: Setting, value: Option<bool>) -> bool {
        match self.write().devices.get_mut(&id) {
            Some(entry) => {
                entry.overrides.set(setting, value);
                true
            }
            None => false,
        }
    }

    pub fn set_config(&self, config: AvailabilityConfig) {
        self.write().config = config;
    }

    /// Look up an endpoint id by friendly name.
    pub fn find_by_name(&self, name: &str) -> Option<EndpointId> {
        self.read()
            .devices
            .values()
            .find(|entry| entry.friendly_name.as_deref() == Some(name))
            .map(|entry| entry.endpoint.id)
    }

    pub fn len(&self) -> usize {
        self.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Fleet> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Fleet> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EndpointDirectory for FleetRegistry {
    fn list_known_endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self
            .read()
            .devices
            .values()
            .map(|entry| entry.endpoint.clone())
            .collect();
        endpoints.sort_by_key(|e| e.id);
        endpoints
    }

    fn resolve(&self, id: EndpointId) -> Option<Endpoint> {
        self.read().devices.get(&id).map(|entry| entry.endpoint.clone())
    }
}

impl SettingsStore for FleetRegistry {
    fn global_config(&self) -> AvailabilityConfig {
        self.read().config.clone()
    }

    fn endpoint_overrides(&self, id: EndpointId) -> EndpointOverrides {
        self.read()
            .devices
            .get(&id)
            .map(|entry| entry.overrides)
            .unwrap_or_default()
    }

    fn display_name(&self, id: EndpointId) -> String {
        self.read()
            .devices
            .get(&id)
            .and_then(|entry| entry.friendly_name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}
