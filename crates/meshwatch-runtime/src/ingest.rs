//! [`TrafficIngestor`] – feeds traffic notifications from the event bus into
//! the engine.
//!
//! `joined` events start a fresh reconciliation on their own task so a
//! startup probe never stalls the lane; every other kind is handled inline.

use meshwatch_middleware::TopicReceiver;
use meshwatch_types::{EventPayload, TrafficEvent, TrafficKind};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::engine::AvailabilityEngine;

pub struct TrafficIngestor {
    engine: AvailabilityEngine,
}

impl TrafficIngestor {
    pub fn new(engine: AvailabilityEngine) -> Self {
        Self { engine }
    }

    /// Run [`TrafficIngestor::run`] on a new task.
    pub fn spawn(self, receiver: TopicReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }

    /// Consume `receiver` until the bus closes.
    pub async fn run(self, mut receiver: TopicReceiver) {
        while let Some(event) = receiver.recv().await {
            match event.payload {
                EventPayload::Traffic(traffic) => self.dispatch(traffic),
                other => trace!(?other, "ignoring non-traffic event"),
            }
        }
        debug!("traffic lane closed; ingestor exiting");
    }

    pub fn dispatch(&self, traffic: TrafficEvent) {
        let Some(endpoint) = self.engine.resolve(traffic.endpoint) else {
            debug!(endpoint = %traffic.endpoint, kind = ?traffic.kind, "traffic from unknown endpoint");
            return;
        };
        match traffic.kind {
            TrafficKind::Joined => {
                let engine = self.engine.clone();
                tokio::spawn(async move { engine.on_connect(&endpoint).await });
            }
            kind => self.engine.on_traffic(kind, &endpoint),
        }
    }
}
