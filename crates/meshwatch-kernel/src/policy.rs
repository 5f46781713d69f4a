//! [`PolicyResolver`] – decides which endpoints take part in availability
//! tracking and resolves per-endpoint setting overrides.
//!
//! The allow/deny lists are captured once at construction.  Overrides are
//! never cached: callers pass in the [`EndpointOverrides`] they just fetched
//! from the settings store, so runtime setting changes take effect on the
//! next decision.

use std::collections::HashSet;

use meshwatch_types::{AvailabilityConfig, EndpointId, EndpointOverrides, Setting};

/// Allow/deny list policy.
///
/// # Example
///
/// ```
/// use meshwatch_kernel::policy::PolicyResolver;
/// use meshwatch_types::EndpointId;
///
/// let policy = PolicyResolver::new(["hall_plug"], ["0x0000000000000002"]);
///
/// // A non-empty allow-list wins; the deny-list is ignored.
/// assert!(policy.is_tracked(EndpointId(1), "hall_plug"));
/// assert!(!policy.is_tracked(EndpointId(3), "attic_sensor"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl PolicyResolver {
    /// Build a resolver from identifier / friendly-name lists.
    ///
    /// Identifiers given in hex form are normalised to the canonical
    /// `0x%016x` rendering so `0x1a` and `0x000000000000001a` match alike.
    pub fn new<A, D>(allow: A, deny: D) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            allow: allow.into_iter().map(|e| normalise(e.as_ref())).collect(),
            deny: deny.into_iter().map(|e| normalise(e.as_ref())).collect(),
        }
    }

    pub fn from_config(config: &AvailabilityConfig) -> Self {
        Self::new(&config.allow_list, &config.deny_list)
    }

    /// Return `true` when the endpoint participates in availability tracking.
    ///
    /// With a non-empty allow-list, only listed endpoints are tracked.
    /// Otherwise every endpoint is tracked unless it is deny-listed.  Entries
    /// match either the endpoint's address or its display name.
    pub fn is_tracked(&self, id: EndpointId, name: &str) -> bool {
        let listed = |set: &HashSet<String>| set.contains(&id.to_string()) || set.contains(name);
        if !self.allow.is_empty() {
            listed(&self.allow)
        } else {
            !listed(&self.deny)
        }
    }

    /// Resolve `setting` for one endpoint: the override when present, the
    /// global `default` otherwise.
    pub fn resolve_override(overrides: &EndpointOverrides, setting: Setting, default: bool) -> bool {
        overrides.get(setting).unwrap_or(default)
    }
}

fn normalise(entry: &str) -> String {
    let entry = entry.trim();
    let is_hex_address = entry.len() > 2
        && (entry.starts_with("0x") || entry.starts_with("0X"))
        && entry[2..].chars().all(|c| c.is_ascii_hexdigit());
    match entry.parse::<EndpointId>() {
        Ok(id) if is_hex_address => id.to_string(),
        _ => entry.to_string(),
    }
}
