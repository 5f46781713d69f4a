//! Capability classifier.
//!
//! Decides how an endpoint's liveness can be established:
//!
//! - **Pingable** endpoints answer an active probe reliably.  These are
//!   mains-powered routers plus a fixed set of end-device models known to
//!   stay awake.
//! - Everything else is **non-pingable** and must be judged from passive
//!   traffic timing.
//!
//! Classification is pure and must be recomputed on every use: metadata can
//! change after a re-join.

use meshwatch_types::{DeviceKind, Endpoint, PowerSource};

/// End-device models that keep their receiver on and answer probes.
pub const PINGABLE_END_DEVICE_MODELS: &[&str] = &["E11-N1EA", "E11-U2E", "E11-U3E", "53170161", "SP 120"];

/// Manufacturer code of IKEA of Sweden.
const IKEA_MANUFACTURER_CODE: u16 = 0x117c;

/// How liveness is determined for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityClass {
    Pingable,
    /// A router that runs on battery; probing it would drain it.
    NonPingableRouter,
    NonPingableOther,
}

pub fn classify(endpoint: &Endpoint) -> CapabilityClass {
    let known_model = endpoint
        .model
        .as_deref()
        .is_some_and(|model| PINGABLE_END_DEVICE_MODELS.contains(&model));
    if known_model {
        return CapabilityClass::Pingable;
    }
    match (endpoint.kind, endpoint.power_source) {
        (DeviceKind::Router, PowerSource::Battery) => CapabilityClass::NonPingableRouter,
        (DeviceKind::Router, _) => CapabilityClass::Pingable,
        _ => CapabilityClass::NonPingableOther,
    }
}

pub fn is_pingable(endpoint: &Endpoint) -> bool {
    classify(endpoint) == CapabilityClass::Pingable
}

/// Return `true` for product families that re-report their own state right
/// after announcing, so no refresh is needed on announce.
pub fn self_reports_on_announce(endpoint: &Endpoint) -> bool {
    endpoint.manufacturer_code == Some(IKEA_MANUFACTURER_CODE)
        || endpoint
            .manufacturer
            .as_deref()
            .is_some_and(|m| m.to_ascii_uppercase().starts_with("IKEA"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_types::EndpointId;

    fn endpoint(kind: DeviceKind, power: PowerSource, model: Option<&str>) -> Endpoint {
        let mut e = Endpoint::new(EndpointId(1), kind);
        e.power_source = power;
        e.model = model.map(String::from);
        e
    }

    #[test]
    fn mains_router_is_pingable() {
        let e = endpoint(DeviceKind::Router, PowerSource::Mains, None);
        assert_eq!(classify(&e), CapabilityClass::Pingable);
    }

    #[test]
    fn router_with_unknown_power_is_pingable() {
        let e = endpoint(DeviceKind::Router, PowerSource::Unknown, None);
        assert!(is_pingable(&e));
    }

    #[test]
    fn battery_router_is_not_pingable() {
        let e = endpoint(DeviceKind::Router, PowerSource::Battery, None);
        assert_eq!(classify(&e), CapabilityClass::NonPingableRouter);
    }

    #[test]
    fn battery_end_device_is_not_pingable() {
        let e = endpoint(DeviceKind::EndDevice, PowerSource::Battery, Some("WSDCGQ11LM"));
        assert_eq!(classify(&e), CapabilityClass::NonPingableOther);
    }

    #[test]
    fn known_end_device_model_is_pingable() {
        let e = endpoint(DeviceKind::EndDevice, PowerSource::Mains, Some("E11-N1EA"));
        assert!(is_pingable(&e));
    }

    #[test]
    fn reclassifies_after_metadata_change() {
        let mut e = endpoint(DeviceKind::EndDevice, PowerSource::Battery, None);
        assert!(!is_pingable(&e));
        e.kind = DeviceKind::Router;
        e.power_source = PowerSource::Mains;
        assert!(is_pingable(&e));
    }

    #[test]
    fn ikea_devices_self_report() {
        let mut e = endpoint(DeviceKind::Router, PowerSource::Mains, None);
        assert!(!self_reports_on_announce(&e));
        e.manufacturer_code = Some(0x117c);
        assert!(self_reports_on_announce(&e));
        e.manufacturer_code = None;
        e.manufacturer = Some("IKEA of Sweden".to_string());
        assert!(self_reports_on_announce(&e));
    }
}
