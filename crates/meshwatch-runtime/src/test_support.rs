//! In-memory collaborators for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use meshwatch_middleware::{FleetRegistry, ProbeTransport, PublishOptions, Publisher, RefreshTransport};
use meshwatch_types::{
    Availability, AvailabilityConfig, DeviceKind, Endpoint, EndpointId, MeshError, PowerSource,
};

use crate::engine::{AvailabilityEngine, Collaborators};

/// Probe whose answers are scripted per endpoint; unscripted probes succeed.
#[derive(Default)]
pub(crate) struct ScriptedProbe {
    script: Mutex<HashMap<EndpointId, VecDeque<bool>>>,
    calls: Mutex<Vec<EndpointId>>,
    latency: Mutex<Duration>,
}

impl ScriptedProbe {
    pub(crate) fn script(&self, id: EndpointId, results: &[bool]) {
        self.script
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .extend(results.iter().copied());
    }

    /// Every later probe takes `latency` before answering.
    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub(crate) fn calls(&self, id: EndpointId) -> usize {
        self.calls.lock().unwrap().iter().filter(|&&c| c == id).count()
    }
}

#[async_trait]
impl ProbeTransport for ScriptedProbe {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), MeshError> {
        self.calls.lock().unwrap().push(endpoint.id);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let ok = self
            .script
            .lock()
            .unwrap()
            .get_mut(&endpoint.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(true);
        if ok {
            Ok(())
        } else {
            Err(MeshError::ProbeFailed {
                endpoint: endpoint.id,
                details: "no route".to_string(),
            })
        }
    }
}

/// Refresh transport with `color` and `color_temp` sharing one resolver.
pub(crate) struct RecordingRefresh {
    resolvers: HashMap<&'static str, &'static str>,
    calls: Mutex<Vec<(EndpointId, String)>>,
    fail: AtomicBool,
}

impl Default for RecordingRefresh {
    fn default() -> Self {
        Self {
            resolvers: HashMap::from([
                ("state", "on_off"),
                ("brightness", "level"),
                ("color", "color"),
                ("color_temp", "color"),
            ]),
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }
}

impl RecordingRefresh {
    pub(crate) fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self, id: EndpointId) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == id)
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[async_trait]
impl RefreshTransport for RecordingRefresh {
    fn resolver_for(&self, _endpoint: &Endpoint, key: &str) -> Option<String> {
        self.resolvers.get(key).map(|r| r.to_string())
    }

    async fn refresh(&self, endpoint: &Endpoint, key: &str) -> Result<(), MeshError> {
        self.calls.lock().unwrap().push((endpoint.id, key.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(MeshError::RefreshFailed {
                endpoint: endpoint.id,
                key: key.to_string(),
                details: "timeout".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingPublisher {
    published: Mutex<Vec<(String, Availability)>>,
}

impl RecordingPublisher {
    pub(crate) fn published(&self) -> Vec<(String, Availability)> {
        self.published.lock().unwrap().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, state: Availability, options: PublishOptions) -> Result<(), MeshError> {
        assert!(options.retain, "availability must be retained");
        self.published.lock().unwrap().push((topic.to_string(), state));
        Ok(())
    }
}

pub(crate) struct Harness {
    pub fleet: Arc<FleetRegistry>,
    pub probe: Arc<ScriptedProbe>,
    pub refresh: Arc<RecordingRefresh>,
    pub publisher: Arc<RecordingPublisher>,
}

impl Harness {
    pub(crate) fn new(config: AvailabilityConfig) -> Self {
        Self {
            fleet: Arc::new(FleetRegistry::new(config)),
            probe: Arc::default(),
            refresh: Arc::default(),
            publisher: Arc::default(),
        }
    }

    /// Register `endpoint` under `name` and hand it back.
    pub(crate) fn add(&self, endpoint: Endpoint, name: &str) -> Endpoint {
        self.fleet.register(endpoint.clone(), Some(name.to_string()));
        endpoint
    }

    pub(crate) fn engine(&self) -> AvailabilityEngine {
        AvailabilityEngine::new(Collaborators {
            directory: self.fleet.clone(),
            probe: self.probe.clone(),
            refresh: self.refresh.clone(),
            settings: self.fleet.clone(),
            publisher: self.publisher.clone(),
        })
    }
}

/// Mains-powered router: pingable.
pub(crate) fn router(id: u64) -> Endpoint {
    let mut e = Endpoint::new(EndpointId(id), DeviceKind::Router);
    e.power_source = PowerSource::Mains;
    e
}

/// Battery end device: passive checks only.
pub(crate) fn sensor(id: u64) -> Endpoint {
    let mut e = Endpoint::new(EndpointId(id), DeviceKind::EndDevice);
    e.power_source = PowerSource::Battery;
    e
}

/// Let spawned tasks run.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
