//! Passive inactivity rule for endpoints that cannot be probed.
//!
//! A non-pingable endpoint is judged purely from the timestamp of the last
//! frame it sent.  The rule only ever concludes *inactive*; coming back online
//! is driven by inbound traffic, never by this check.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// How often passive endpoints are checked.
pub const PASSIVE_CHECK_INTERVAL: Duration = Duration::from_secs(300);

/// Silence longer than this marks a passive endpoint offline.
pub const PASSIVE_TIMEOUT: TimeDelta = TimeDelta::hours(25);

/// Outcome of a passive check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveHealth {
    /// No frame has ever been received; nothing can be concluded.
    NeverSeen,
    /// Last frame is within [`PASSIVE_TIMEOUT`].
    Recent,
    /// Silent for strictly longer than [`PASSIVE_TIMEOUT`].
    Inactive,
}

/// Evaluate the passive rule at `now`.
///
/// # Example
///
/// ```
/// use chrono::{TimeDelta, Utc};
/// use meshwatch_kernel::inactivity::{passive_health, PassiveHealth, PASSIVE_TIMEOUT};
///
/// let now = Utc::now();
/// assert_eq!(passive_health(None, now), PassiveHealth::NeverSeen);
/// assert_eq!(passive_health(Some(now - PASSIVE_TIMEOUT), now), PassiveHealth::Recent);
/// assert_eq!(
///     passive_health(Some(now - PASSIVE_TIMEOUT - TimeDelta::milliseconds(1)), now),
///     PassiveHealth::Inactive,
/// );
/// ```
pub fn passive_health(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> PassiveHealth {
    match last_seen {
        None => PassiveHealth::NeverSeen,
        Some(seen) if now - seen > PASSIVE_TIMEOUT => PassiveHealth::Inactive,
        Some(_) => PassiveHealth::Recent,
    }
}
