//! TCP-connect probe transport.
//!
//! An endpoint counts as reachable when a TCP connection to its configured
//! `probe_addr` completes within the probe timeout.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use meshwatch_middleware::ProbeTransport;
use meshwatch_types::{Endpoint, EndpointId, MeshError};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::DeviceConfig;

pub struct TcpProbe {
    addresses: HashMap<EndpointId, String>,
    timeout_ms: u64,
}

impl TcpProbe {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            addresses: HashMap::new(),
            timeout_ms,
        }
    }

    pub fn with_address(mut self, id: EndpointId, addr: impl Into<String>) -> Self {
        self.addresses.insert(id, addr.into());
        self
    }

    /// Probe addresses for every device that has one.
    pub fn from_devices(devices: &[DeviceConfig], timeout_ms: u64) -> Self {
        devices
            .iter()
            .filter_map(|d| d.probe_addr.as_ref().map(|addr| (d.address, addr)))
            .fold(Self::new(timeout_ms), |probe, (id, addr)| probe.with_address(id, addr.clone()))
    }
}

#[async_trait]
impl ProbeTransport for TcpProbe {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), MeshError> {
        let failed = |details: String| MeshError::ProbeFailed {
            endpoint: endpoint.id,
            details,
        };
        let addr = self
            .addresses
            .get(&endpoint.id)
            .ok_or_else(|| failed("no probe address configured".to_string()))?;

        match timeout(Duration::from_millis(self.timeout_ms), TcpStream::connect(addr.as_str())).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(failed(format!("{addr}: {e}"))),
            Err(_) => Err(failed(format!("{addr}: no answer within {} ms", self.timeout_ms))),
        }
    }
}
