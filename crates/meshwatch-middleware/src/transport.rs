//! Collaborator contracts consumed by the availability engine.
//!
//! The engine never talks to the radio stack, the settings store or the
//! publication transport directly.  Each is reached through one of the traits
//! below so that deployments (and tests) can plug in their own
//! implementations.
//!
//! - [`EndpointDirectory`] – the population of known endpoints.
//! - [`ProbeTransport`] – active liveness probe (async, may take a while).
//! - [`RefreshTransport`] – best-effort state re-read (async).
//! - [`SettingsStore`] – global config, per-endpoint overrides, display names.
//! - [`Publisher`] – retained, fire-and-forget availability announcements.

use async_trait::async_trait;
use meshwatch_types::{Availability, AvailabilityConfig, Endpoint, EndpointId, EndpointOverrides, MeshError};

/// Read access to the endpoints known to the network stack.
pub trait EndpointDirectory: Send + Sync {
    /// Every endpoint currently known, in a stable order.
    fn list_known_endpoints(&self) -> Vec<Endpoint>;

    /// Current metadata for `id`, or `None` when the endpoint has been
    /// removed.
    fn resolve(&self, id: EndpointId) -> Option<Endpoint>;
}

/// Active liveness probe.
///
/// The engine owns no timeout for the round-trip; implementations are
/// expected to fail on their own schedule.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), MeshError>;
}

/// Best-effort re-read of an endpoint's state.
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    /// Name of the resolver able to fetch `key` from `endpoint`, if any.
    ///
    /// Several keys may be served by the same resolver (e.g. `color` and
    /// `color_temp`); the engine issues at most one refresh per resolver.
    fn resolver_for(&self, endpoint: &Endpoint, key: &str) -> Option<String>;

    async fn refresh(&self, endpoint: &Endpoint, key: &str) -> Result<(), MeshError>;
}

/// Live view of the settings store. Every call reflects the current
/// configuration; callers must not cache the results.
pub trait SettingsStore: Send + Sync {
    fn global_config(&self) -> AvailabilityConfig;

    fn endpoint_overrides(&self, id: EndpointId) -> EndpointOverrides;

    /// Human-readable name used as the publication topic key.
    fn display_name(&self, id: EndpointId) -> String;
}

/// Delivery options for a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub retain: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self { retain: true }
    }
}

/// Publication transport for availability announcements.
///
/// Implementations must not block: publishing is fire-and-forget and no
/// acknowledgment is awaited.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, state: Availability, options: PublishOptions) -> Result<(), MeshError>;
}
