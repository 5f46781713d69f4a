//! `meshwatch-kernel` – Pure decision rules
//!
//! Side-effect free policy consulted by the runtime before it arms a timer or
//! publishes anything.
//!
//! # Modules
//!
//! - [`policy`] – [`PolicyResolver`][policy::PolicyResolver]:
//!   allow/deny list membership and per-endpoint setting overrides.
//! - [`classifier`] – [`classify`][classifier::classify]:
//!   decides whether an endpoint can be actively probed, and which product
//!   families re-report their state after announcing.
//! - [`inactivity`] – [`passive_health`][inactivity::passive_health]:
//!   the 25-hour silence rule applied to endpoints that cannot be probed.

pub mod classifier;
pub mod inactivity;
pub mod policy;

pub use classifier::{CapabilityClass, classify, is_pingable, self_reports_on_announce};
pub use inactivity::{PASSIVE_CHECK_INTERVAL, PASSIVE_TIMEOUT, PassiveHealth, passive_health};
pub use policy::PolicyResolver;
