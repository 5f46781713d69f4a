//! [`AvailabilityTable`] – last known state per endpoint and the transition
//! rules that decide what a state change must trigger.
//!
//! [`AvailabilityTable::apply`] records the new state *before* the caller
//! runs any side effect.  A refresh that itself produces traffic (and thus a
//! second `apply` for the same endpoint) therefore sees the updated state and
//! does not publish or refresh again.

use std::collections::HashMap;

use meshwatch_types::{Availability, EndpointId};

/// Why a data refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// First contact since the engine started.
    Startup,
    /// The endpoint came back from offline.
    Reconnect,
    /// The endpoint announced itself while already believed online.
    Announce,
}

/// Per-endpoint switches resolved from the settings store for one `apply`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshGates {
    pub on_startup: bool,
    pub on_reconnect: bool,
}

/// Effects a single `apply` call asks the caller to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub prior: Option<Availability>,
    pub publish: bool,
    pub refresh: Option<RefreshReason>,
}

#[derive(Debug, Default)]
pub struct AvailabilityTable {
    states: HashMap<EndpointId, Availability>,
}

impl AvailabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: EndpointId) -> Option<Availability> {
        self.states.get(&id).copied()
    }

    /// Record `state` for `id` and report which effects are due.
    ///
    /// * publish – the state differs from the recorded one, or `force`.
    /// * refresh (startup) – online with no prior record and the startup
    ///   gate open.
    /// * refresh (reconnect) – online after a recorded offline and the
    ///   reconnect gate open.
    pub fn apply(&mut self, id: EndpointId, state: Availability, force: bool, gates: RefreshGates) -> Transition {
        let prior = self.states.insert(id, state);
        let refresh = match (state, prior) {
            (Availability::Online, None) if gates.on_startup => Some(RefreshReason::Startup),
            (Availability::Online, Some(Availability::Offline)) if gates.on_reconnect => {
                Some(RefreshReason::Reconnect)
            }
            _ => None,
        };
        Transition {
            prior,
            publish: force || prior != Some(state),
            refresh,
        }
    }

    /// Drop the record for `id`.
    pub fn remove(&mut self, id: EndpointId) -> Option<Availability> {
        self.states.remove(&id)
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
