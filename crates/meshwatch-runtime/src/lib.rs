//! `meshwatch-runtime` – the availability engine
//!
//! Wires the pure rules from `meshwatch-kernel` to timers, the state table and
//! the collaborator traits from `meshwatch-middleware`.
//!
//! # Modules
//!
//! - [`engine`] – [`AvailabilityEngine`][engine::AvailabilityEngine]:
//!   `start` / `stop` / `on_connect` / `on_traffic`, publication and refresh.
//! - [`scheduler`] – [`LivenessScheduler`][scheduler::LivenessScheduler]:
//!   at most one cancellable timer per endpoint.
//! - [`state`] – [`AvailabilityTable`][state::AvailabilityTable]:
//!   last known state and the transition rules.
//! - [`ingest`] – [`TrafficIngestor`][ingest::TrafficIngestor]:
//!   drains the traffic lane of the event bus into the engine.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   console logging plus optional OTLP export.

pub mod engine;
pub mod ingest;
pub mod scheduler;
pub mod state;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use engine::{AvailabilityEngine, Collaborators};
pub use ingest::TrafficIngestor;
pub use scheduler::{LivenessScheduler, TimerKind};
pub use state::{AvailabilityTable, RefreshGates, RefreshReason, Transition};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
