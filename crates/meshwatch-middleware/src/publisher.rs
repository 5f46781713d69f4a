//! [`BusPublisher`] – publication transport backed by the [`EventBus`].
//!
//! Each announcement becomes an [`EventPayload::Availability`] event on
//! [`Topic::Availability`], where bridges to the outside world (or the CLI)
//! pick it up.

use meshwatch_types::{Availability, AvailabilityUpdate, Event, EventPayload, MeshError};

use crate::bus::{EventBus, Topic};
use crate::transport::{PublishOptions, Publisher};

pub struct BusPublisher {
    bus: EventBus,
    source: String,
}

impl BusPublisher {
    pub fn new(bus: EventBus, source: impl Into<String>) -> Self {
        Self {
            bus,
            source: source.into(),
        }
    }
}

impl Publisher for BusPublisher {
    fn publish(&self, topic: &str, state: Availability, options: PublishOptions) -> Result<(), MeshError> {
        let event = Event::new(
            self.source.clone(),
            EventPayload::Availability(AvailabilityUpdate {
                topic: topic.to_string(),
                state,
                retain: options.retain,
            }),
        );
        self.bus
            .publish_to(Topic::Availability, event)
            .map(|_| ())
            .map_err(|e| MeshError::Publish(e.to_string()))
    }
}
