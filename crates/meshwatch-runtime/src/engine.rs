//! [`AvailabilityEngine`] – decides, per endpoint, whether it is online or
//! offline and announces every change exactly once.
//!
//! # Lifecycle
//!
//! 1. [`AvailabilityEngine::start`] reconciles every known endpoint through
//!    [`AvailabilityEngine::on_connect`]: an optional startup probe, one
//!    forced publication of the endpoint's state, then a timer.
//! 2. While running, two kinds of evidence feed the state table:
//!    * timers owned by the [`LivenessScheduler`] – a one-shot probe after
//!      `availability_timeout` for pingable endpoints (always re-armed), a
//!      300-second passive inactivity check for the others;
//!    * inbound traffic via [`AvailabilityEngine::on_traffic`], which marks
//!      the endpoint online and pushes its probe back.
//! 3. [`AvailabilityEngine::stop`] cancels every timer and force-publishes
//!    `offline` for every tracked endpoint.
//!
//! # Side effects
//!
//! A state change publishes `<name>/availability` (retained).  Coming online
//! for the first time (when `refresh_on_startup` is enabled), coming back from
//! offline, or announcing while already online additionally triggers a
//! best-effort data refresh on a separate task, so a slow or failing refresh
//! never delays the publication.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use meshwatch_kernel::{PASSIVE_CHECK_INTERVAL, PassiveHealth, PolicyResolver, classifier, passive_health};
use meshwatch_middleware::{
    EndpointDirectory, ProbeTransport, PublishOptions, Publisher, RefreshTransport, SettingsStore,
};
use meshwatch_types::{Availability, Endpoint, EndpointId, Setting, TrafficKind};
use tracing::{debug, error, info, warn};

use crate::scheduler::{LivenessScheduler, TimerKind};
use crate::state::{AvailabilityTable, RefreshGates, RefreshReason};

/// External collaborators the engine is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn EndpointDirectory>,
    pub probe: Arc<dyn ProbeTransport>,
    pub refresh: Arc<dyn RefreshTransport>,
    pub settings: Arc<dyn SettingsStore>,
    pub publisher: Arc<dyn Publisher>,
}

/// Availability tracking engine.  Clone it cheaply – all clones share the
/// same state and timers.
#[derive(Clone)]
pub struct AvailabilityEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    collaborators: Collaborators,
    policy: PolicyResolver,
    probe_period: Duration,
    enabled: bool,
    table: Mutex<AvailabilityTable>,
    scheduler: LivenessScheduler,
    stopped: AtomicBool,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

impl AvailabilityEngine {
    /// Build an engine.  The allow/deny lists and the probe period are read
    /// from the settings store once, here.
    pub fn new(collaborators: Collaborators) -> Self {
        let config = collaborators.settings.global_config();
        Self {
            inner: Arc::new(EngineInner {
                policy: PolicyResolver::from_config(&config),
                probe_period: config.probe_period(),
                enabled: config.is_enabled(),
                collaborators,
                table: Mutex::new(AvailabilityTable::new()),
                scheduler: LivenessScheduler::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Reconcile every endpoint currently known to the directory.
    ///
    /// Endpoints are connected concurrently, so one slow startup probe does
    /// not hold back the others.
    pub async fn start(&self) {
        if !self.inner.enabled {
            info!("availability_timeout is 0; availability tracking disabled");
            return;
        }
        let endpoints = self.inner.collaborators.directory.list_known_endpoints();
        info!(
            endpoints = endpoints.len(),
            timeout_secs = self.inner.probe_period.as_secs(),
            "starting availability tracking"
        );
        join_all(endpoints.iter().map(|endpoint| self.on_connect(endpoint))).await;
    }

    /// Cancel every timer, then announce every tracked endpoint as offline.
    ///
    /// Idempotent.  Once stopped the engine ignores traffic and connects.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let cancelled = self.inner.scheduler.shutdown();
        if !self.inner.enabled {
            return;
        }
        info!(cancelled, "stopping availability tracking");

        for endpoint in self.inner.collaborators.directory.list_known_endpoints() {
            let name = self.display_name(endpoint.id);
            if self.inner.policy.is_tracked(endpoint.id, &name) {
                self.apply(&endpoint, &name, Availability::Offline, true);
            }
        }
        self.table().clear();
    }

    /// Startup / (re)join reconciliation for one endpoint.
    ///
    /// Always force-publishes once for a tracked endpoint, then arms its
    /// timer.  Untracked endpoints are left alone.
    pub async fn on_connect(&self, endpoint: &Endpoint) {
        if !self.is_active() {
            return;
        }
        let name = self.display_name(endpoint.id);
        if !self.inner.policy.is_tracked(endpoint.id, &name) {
            debug!(endpoint = %name, "endpoint not tracked");
            return;
        }

        let state = if self.ping_on_startup(endpoint) {
            let Some(generation) = self.inner.scheduler.reserve(endpoint.id, TimerKind::Probe) else {
                return;
            };
            let state = self.probe_once(endpoint, &name).await;
            // A leave or fresh traffic while pinging supersedes the result.
            if !self.inner.scheduler.release(endpoint.id, generation) {
                debug!(endpoint = %name, "startup ping result superseded");
                return;
            }
            state
        } else {
            self.availability(endpoint.id).unwrap_or(Availability::Online)
        };
        if !self.is_active() {
            return;
        }
        self.apply(endpoint, &name, state, true);
        self.arm(endpoint);
    }

    /// Inbound traffic from `endpoint` is proof of life.
    pub fn on_traffic(&self, kind: TrafficKind, endpoint: &Endpoint) {
        if !self.is_active() {
            return;
        }
        if kind == TrafficKind::Leave {
            debug!(endpoint = %endpoint.id, "endpoint left; dropping tracking record");
            self.forget(endpoint.id);
            return;
        }
        let name = self.display_name(endpoint.id);
        if !self.inner.policy.is_tracked(endpoint.id, &name) {
            return;
        }

        let prior = self.availability(endpoint.id);
        self.apply(endpoint, &name, Availability::Online, false);

        if classifier::is_pingable(endpoint) {
            self.arm_probe(endpoint.id);
        } else if self.inner.scheduler.armed(endpoint.id).is_none() {
            self.arm_passive(endpoint.id);
        }

        // A device power-cycled within the probe window is never seen
        // offline, so its cached state may be stale after it re-announces.
        if kind == TrafficKind::Announce
            && prior == Some(Availability::Online)
            && !classifier::self_reports_on_announce(endpoint)
        {
            debug!(endpoint = %name, "announce while online");
            self.spawn_refresh(endpoint.clone(), &name, RefreshReason::Announce);
        }
    }

    /// Last recorded state of `id`, if any.
    pub fn availability(&self, id: EndpointId) -> Option<Availability> {
        self.table().get(id)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    fn is_active(&self) -> bool {
        self.inner.enabled && !self.is_stopped()
    }

    pub(crate) fn resolve(&self, id: EndpointId) -> Option<Endpoint> {
        self.inner.collaborators.directory.resolve(id)
    }

    /// Record `state` for `endpoint`, publishing and refreshing as the
    /// transition requires.  Ignored once the engine is stopped.
    pub(crate) fn set_availability(&self, endpoint: &Endpoint, state: Availability, force: bool) {
        if !self.is_active() {
            return;
        }
        let name = self.display_name(endpoint.id);
        self.apply(endpoint, &name, state, force);
    }

    fn apply(&self, endpoint: &Endpoint, name: &str, state: Availability, force: bool) {
        let settings = &self.inner.collaborators.settings;
        let config = settings.global_config();
        let overrides = settings.endpoint_overrides(endpoint.id);
        let gates = RefreshGates {
            on_startup: PolicyResolver::resolve_override(
                &overrides,
                Setting::RefreshOnStartup,
                config.refresh_on_startup,
            ),
            on_reconnect: PolicyResolver::resolve_override(
                &overrides,
                Setting::RefreshOnReconnect,
                config.refresh_on_reconnect,
            ),
        };

        let transition = self.table().apply(endpoint.id, state, force, gates);

        if let Some(reason) = transition.refresh {
            self.spawn_refresh(endpoint.clone(), name, reason);
        }
        if transition.publish {
            self.publish(name, state);
        }
    }

    fn publish(&self, name: &str, state: Availability) {
        let topic = format!("{name}/availability");
        match self
            .inner
            .collaborators
            .publisher
            .publish(&topic, state, PublishOptions::default())
        {
            Ok(()) => info!(endpoint = %name, %state, "published availability"),
            Err(e) => warn!(%topic, error = %e, "failed to publish availability"),
        }
    }

    fn spawn_refresh(&self, endpoint: Endpoint, name: &str, reason: RefreshReason) {
        let keys = self.inner.collaborators.settings.global_config().reconnect_refresh_keys;
        let transport = Arc::clone(&self.inner.collaborators.refresh);
        let name = name.to_string();
        tokio::spawn(async move {
            refresh_endpoint(transport.as_ref(), &endpoint, &name, &keys, reason).await;
        });
    }

    fn ping_on_startup(&self, endpoint: &Endpoint) -> bool {
        let settings = &self.inner.collaborators.settings;
        classifier::is_pingable(endpoint)
            && PolicyResolver::resolve_override(
                &settings.endpoint_overrides(endpoint.id),
                Setting::PingOnStartup,
                settings.global_config().ping_on_startup,
            )
    }

    /// One probe round-trip, without touching the state table.
    async fn probe_once(&self, endpoint: &Endpoint, name: &str) -> Availability {
        match self.inner.collaborators.probe.probe(endpoint).await {
            Ok(()) => {
                debug!(endpoint = %name, "successfully pinged");
                Availability::Online
            }
            Err(e) => {
                // Already-dead devices would otherwise log an error every cycle.
                if self.availability(endpoint.id) == Some(Availability::Offline) {
                    debug!(endpoint = %name, error = %e, "failed to ping");
                } else {
                    error!(endpoint = %name, error = %e, "failed to ping");
                }
                Availability::Offline
            }
        }
    }

    fn arm(&self, endpoint: &Endpoint) {
        if classifier::is_pingable(endpoint) {
            self.arm_probe(endpoint.id);
        } else {
            self.arm_passive(endpoint.id);
        }
    }

    fn arm_probe(&self, id: EndpointId) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.probe_period;
        self.inner.scheduler.arm(id, TimerKind::Probe, move |generation| async move {
            tokio::time::sleep(period).await;
            if let Some(inner) = weak.upgrade() {
                AvailabilityEngine { inner }.on_probe_timer(id, generation).await;
            }
        });
    }

    fn arm_passive(&self, id: EndpointId) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.scheduler.arm(id, TimerKind::Passive, move |generation| async move {
            let first = tokio::time::Instant::now() + PASSIVE_CHECK_INTERVAL;
            let mut ticker = tokio::time::interval_at(first, PASSIVE_CHECK_INTERVAL);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let engine = AvailabilityEngine { inner };
                if !engine.on_passive_tick(id, generation) {
                    return;
                }
            }
        });
    }

    /// Runs inside the timer task, which keeps its scheduler slot until the
    /// probe answers.
    async fn on_probe_timer(&self, id: EndpointId, generation: u64) {
        let Some(endpoint) = self.resolve(id) else {
            if self.inner.scheduler.release(id, generation) {
                debug!(endpoint = %id, "endpoint no longer known; stop probing");
                self.table().remove(id);
            }
            return;
        };
        let name = self.display_name(id);
        let state = self.probe_once(&endpoint, &name).await;
        if !self.inner.scheduler.release(id, generation) {
            debug!(endpoint = %name, "ping result superseded");
            return;
        }
        if !self.is_active() {
            return;
        }
        self.apply(&endpoint, &name, state, false);
        // Re-armed whatever the outcome; classification is re-evaluated here.
        self.arm(&endpoint);
    }

    /// Returns `false` when the interval should stop.
    fn on_passive_tick(&self, id: EndpointId, generation: u64) -> bool {
        if !self.inner.scheduler.is_current(id, generation) {
            return false;
        }
        let Some(endpoint) = self.resolve(id) else {
            debug!(endpoint = %id, "endpoint no longer known; stop passive checks");
            self.inner.scheduler.release(id, generation);
            self.table().remove(id);
            return false;
        };
        if passive_health(endpoint.last_seen, Utc::now()) == PassiveHealth::Inactive {
            self.set_availability(&endpoint, Availability::Offline, false);
        }
        true
    }

    fn forget(&self, id: EndpointId) {
        self.inner.scheduler.cancel(id);
        self.table().remove(id);
    }

    fn display_name(&self, id: EndpointId) -> String {
        self.inner.collaborators.settings.display_name(id)
    }

    fn table(&self) -> MutexGuard<'_, AvailabilityTable> {
        self.inner.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Request every configured key, at most once per resolver.  Failures are
/// logged and the remaining keys are still attempted.
async fn refresh_endpoint(
    transport: &dyn RefreshTransport,
    endpoint: &Endpoint,
    name: &str,
    keys: &[String],
    reason: RefreshReason,
) -> usize {
    let mut resolvers = HashSet::new();
    let mut issued = 0;
    for key in keys {
        let Some(resolver) = transport.resolver_for(endpoint, key) else {
            continue;
        };
        if !resolvers.insert(resolver) {
            continue;
        }
        issued += 1;
        if let Err(e) = transport.refresh(endpoint, key).await {
            error!(endpoint = %name, %key, ?reason, error = %e, "failed to refresh state");
        }
    }
    debug!(endpoint = %name, ?reason, issued, "state refresh finished");
    issued
}
