//! `meshwatch-middleware` – Plumbing between the engine and the outside world
//!
//! Routes traffic notifications and availability announcements without caring
//! about their meaning, and defines the collaborator contracts the engine is
//! written against.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`transport`] – collaborator traits (directory, probe, refresh,
//!   settings, publisher).
//! - [`registry`] – [`FleetRegistry`], an in-memory directory and settings
//!   store.
//! - [`publisher`] – [`BusPublisher`], a publication transport that emits on
//!   the bus.

pub mod bus;
pub mod publisher;
pub mod registry;
pub mod transport;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use publisher::BusPublisher;
pub use registry::{DeviceEntry, FleetRegistry};
pub use transport::{
    EndpointDirectory, ProbeTransport, PublishOptions, Publisher, RefreshTransport, SettingsStore,
};
