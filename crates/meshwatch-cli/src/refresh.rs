//! Refresh transport that only logs what it would request.
//!
//! Keys are mapped onto the cluster that serves them, so `color` and
//! `color_temp` share one read.

use async_trait::async_trait;
use meshwatch_middleware::RefreshTransport;
use meshwatch_types::{Endpoint, MeshError};
use tracing::info;

pub struct LoggingRefresh;

fn cluster_for(key: &str) -> Option<&'static str> {
    match key {
        "state" => Some("genOnOff"),
        "brightness" => Some("genLevelCtrl"),
        "color" | "color_temp" => Some("lightingColorCtrl"),
        _ => None,
    }
}

#[async_trait]
impl RefreshTransport for LoggingRefresh {
    fn resolver_for(&self, _endpoint: &Endpoint, key: &str) -> Option<String> {
        cluster_for(key).map(String::from)
    }

    async fn refresh(&self, endpoint: &Endpoint, key: &str) -> Result<(), MeshError> {
        let cluster = cluster_for(key).ok_or_else(|| MeshError::RefreshFailed {
            endpoint: endpoint.id,
            key: key.to_string(),
            details: "no cluster serves this key".to_string(),
        })?;
        info!(endpoint = %endpoint.id, %key, %cluster, "refresh requested");
        Ok(())
    }
}
