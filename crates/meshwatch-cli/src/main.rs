//! `meshwatch` – availability daemon for a mesh of wireless endpoints
//!
//! 1. Loads `~/.meshwatch/config.toml` (or `$MESHWATCH_CONFIG`).
//! 2. Registers the configured devices and starts the availability engine.
//! 3. Reads traffic lines from stdin and prints every availability
//!    announcement to stdout.
//! 4. On **Ctrl-C** stops the engine, which announces every tracked device as
//!    offline, and exits.

mod config;
mod feed;
mod probe;
mod refresh;

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::Notify;
use tracing::{info, warn};

use meshwatch_middleware::{BusPublisher, EventBus, FleetRegistry, Topic, TopicReceiver};
use meshwatch_runtime::{AvailabilityEngine, Collaborators, TrafficIngestor, init_tracing};
use meshwatch_types::{Availability, EventPayload, Setting};

use crate::config::Config;
use crate::probe::TcpProbe;
use crate::refresh::LoggingRefresh;

const OVERRIDABLE: [Setting; 3] = [
    Setting::PingOnStartup,
    Setting::RefreshOnStartup,
    Setting::RefreshOnReconnect,
];

fn main() {
    let _guard = init_tracing("meshwatch");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            warn!(path = %config::config_path().display(), "no config file; using defaults");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            std::process::exit(1);
        }
    };

    if !cfg.availability.is_enabled() {
        info!("availability_timeout is 0; availability tracking disabled");
        return;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg));
    // The stdin reader may still be parked on a blocking read.
    runtime.shutdown_background();
}

async fn run(cfg: Config) {
    let fleet = Arc::new(FleetRegistry::new(cfg.availability.clone()));
    for device in &cfg.devices {
        fleet.register(device.endpoint(), device.friendly_name.clone());
        for setting in OVERRIDABLE {
            if let Some(value) = device.overrides.get(setting) {
                fleet.set_override(device.address, setting, Some(value));
            }
        }
    }
    println!(
        "  Tracking {} device(s), probe every {}s\n",
        fleet.len(),
        cfg.availability.availability_timeout
    );

    let bus = EventBus::default();
    let printer = tokio::spawn(print_availability(bus.subscribe_to(Topic::Availability)));

    let engine = AvailabilityEngine::new(Collaborators {
        directory: fleet.clone(),
        probe: Arc::new(TcpProbe::from_devices(&cfg.devices, cfg.probe_timeout_ms)),
        refresh: Arc::new(LoggingRefresh),
        settings: fleet.clone(),
        publisher: Arc::new(BusPublisher::new(bus.clone(), "meshwatch-runtime")),
    });
    let ingestor = TrafficIngestor::new(engine.clone()).spawn(bus.subscribe_to(Topic::Traffic));

    let shutdown = Arc::new(Notify::new());
    let notify = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || notify.notify_one()) {
        warn!(error = %e, "Failed to install Ctrl-C handler; devices will not be announced offline on exit");
    }

    engine.start().await;

    let feed = {
        let fleet = fleet.clone();
        let bus = bus.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            feed::run(stdin, &fleet, &bus).await
        })
    };

    shutdown.notified().await;
    println!();
    println!("{}", "⚠  Ctrl-C received – stopping availability tracking …".yellow().bold());

    feed.abort();
    ingestor.abort();
    engine.stop();

    // Let the printer drain the final offline announcements.
    tokio::time::sleep(Duration::from_millis(100)).await;
    printer.abort();
    println!("{}", "  ✓ Exiting meshwatch.".green());
}

async fn print_availability(mut receiver: TopicReceiver) {
    while let Some(event) = receiver.recv().await {
        if let EventPayload::Availability(update) = event.payload {
            let state = match update.state {
                Availability::Online => update.state.as_payload().green(),
                Availability::Offline => update.state.as_payload().red(),
            };
            println!(
                "  {} {} {}",
                event.timestamp.format("%H:%M:%S").to_string().dimmed(),
                update.topic.bold(),
                state
            );
        }
    }
}

fn print_banner() {
    println!();
    println!("  {} {}",
        "meshwatch".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Endpoint availability tracking");
    println!();
}
