//! Line-oriented traffic feed.
//!
//! Each line reads `<kind> <address|friendly name>`, e.g. `announce hall_light`
//! or `message 0x00158d0001a2b3c4`.  Blank lines and `#` comments are skipped.

use chrono::Utc;
use meshwatch_middleware::{EndpointDirectory, EventBus, FleetRegistry, Topic};
use meshwatch_types::{Event, EventPayload, MeshError, TrafficEvent, TrafficKind};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

const SOURCE: &str = "meshwatch-cli::feed";

/// Parse one feed line against the registry.
pub fn parse_line(line: &str, fleet: &FleetRegistry) -> Result<Option<TrafficEvent>, MeshError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (kind, target) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| MeshError::Config(format!("expected '<kind> <device>', got '{line}'")))?;
    let kind: TrafficKind = kind.parse()?;
    let target = target.trim();

    // Friendly names win over addresses: "bed" is valid hex too.
    let endpoint = match fleet.find_by_name(target) {
        Some(id) => id,
        None => {
            let id = target
                .parse()
                .map_err(|_| MeshError::Config(format!("unknown device '{target}'")))?;
            if fleet.resolve(id).is_none() {
                return Err(MeshError::UnknownEndpoint(id));
            }
            id
        }
    };
    Ok(Some(TrafficEvent { endpoint, kind }))
}

/// Read lines until EOF, marking each device seen and putting the event on
/// the traffic lane.
pub async fn run<R>(reader: R, fleet: &FleetRegistry, bus: &EventBus) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read traffic feed");
                break;
            }
        };
        let traffic = match parse_line(&line, fleet) {
            Ok(Some(traffic)) => traffic,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "ignoring feed line");
                continue;
            }
        };
        if traffic.kind != TrafficKind::Leave {
            fleet.mark_seen(traffic.endpoint, Utc::now());
        }
        match bus.publish_to(Topic::Traffic, Event::new(SOURCE, EventPayload::Traffic(traffic))) {
            Ok(_) => forwarded += 1,
            Err(e) => warn!(error = %e, "traffic event dropped"),
        }
    }
    debug!(forwarded, "traffic feed closed");
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwatch_types::{AvailabilityConfig, DeviceKind, Endpoint, EndpointId};

    fn fleet() -> FleetRegistry {
        let fleet = FleetRegistry::new(AvailabilityConfig::default());
        fleet.register(Endpoint::new(EndpointId(0xbed), DeviceKind::Router), Some("hall".to_string()));
        fleet.register(Endpoint::new(EndpointId(0xa), DeviceKind::Router), Some("bed".to_string()));
        fleet
    }

    #[test]
    fn parses_name_and_address() {
        let fleet = fleet();
        let by_name = parse_line("announce hall", &fleet).expect("ok").expect("event");
        assert_eq!(by_name.endpoint, EndpointId(0xbed));
        assert_eq!(by_name.kind, TrafficKind::Announce);

        let by_addr = parse_line("  message 0x0000000000000bed ", &fleet).expect("ok").expect("event");
        assert_eq!(by_addr.endpoint, EndpointId(0xbed));
    }

    #[test]
    fn friendly_name_beats_hex_address() {
        let fleet = fleet();
        let event = parse_line("leave bed", &fleet).expect("ok").expect("event");
        assert_eq!(event.endpoint, EndpointId(0xa));
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let fleet = fleet();
        assert!(parse_line("", &fleet).expect("ok").is_none());
        assert!(parse_line("# joined hall", &fleet).expect("ok").is_none());
    }

    #[test]
    fn rejects_bad_lines() {
        let fleet = fleet();
        assert!(parse_line("announce", &fleet).is_err());
        assert!(parse_line("wave hall", &fleet).is_err());
        assert!(parse_line("message kitchen", &fleet).is_err());
        assert_eq!(
            parse_line("message 0x99", &fleet),
            Err(MeshError::UnknownEndpoint(EndpointId(0x99)))
        );
    }

    #[tokio::test]
    async fn forwards_valid_lines_and_marks_seen() {
        let fleet = fleet();
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Traffic);
        let input: &[u8] = b"message hall\nbogus line here\n\njoined bed\n";

        let forwarded = run(input, &fleet, &bus).await;

        assert_eq!(forwarded, 2);
        let first = rx.recv().await.expect("event");
        assert!(matches!(
            first.payload,
            EventPayload::Traffic(TrafficEvent { endpoint: EndpointId(0xbed), kind: TrafficKind::Message })
        ));
        assert!(fleet.resolve(EndpointId(0xbed)).and_then(|e| e.last_seen).is_some());
    }
}
