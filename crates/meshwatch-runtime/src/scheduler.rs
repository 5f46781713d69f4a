//! [`LivenessScheduler`] – owns the single timer task of every tracked
//! endpoint.
//!
//! Each endpoint has at most one armed timer.  Arming always aborts the
//! previous task before the new one is spawned, and every arm is stamped with
//! a fresh *generation* so a callback that was already running when it got
//! superseded can tell it is stale (see [`LivenessScheduler::release`]).
//!
//! A firing probe keeps its slot until its result is in.  Cancelling or
//! re-arming the endpoint meanwhile aborts the running probe, and a result
//! that still slips through is rejected by `release`.  Work that runs outside
//! a timer task can hold a slot through [`LivenessScheduler::reserve`].
//!
//! After [`LivenessScheduler::shutdown`] no timer can be armed again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use meshwatch_types::EndpointId;
use tokio::task::AbortHandle;

/// What an armed timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// One-shot: probe the endpoint after the availability timeout.
    Probe,
    /// Repeating: apply the passive inactivity rule.
    Passive,
}

struct TimerEntry {
    generation: u64,
    kind: TimerKind,
    /// `None` for a reservation with no task behind it.
    handle: Option<AbortHandle>,
}

impl TimerEntry {
    fn abort(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

#[derive(Default)]
struct Timers {
    entries: HashMap<EndpointId, TimerEntry>,
    next_generation: u64,
    shut_down: bool,
}

#[derive(Default)]
pub struct LivenessScheduler {
    timers: Mutex<Timers>,
}

impl LivenessScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any timer armed for `id`, then spawn `make(generation)` as its
    /// replacement.
    ///
    /// Returns `false` (and spawns nothing) once the scheduler has been shut
    /// down.  Must be called from within a Tokio runtime.
    pub fn arm<F, Fut>(&self, id: EndpointId, kind: TimerKind, make: F) -> bool
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut timers = self.lock();
        let Some(generation) = Self::supersede(&mut timers, id) else {
            return false;
        };
        // Spawned under the lock: the task cannot observe the map before its
        // own entry is in place.
        let handle = tokio::spawn(make(generation)).abort_handle();
        timers.entries.insert(
            id,
            TimerEntry {
                generation,
                kind,
                handle: Some(handle),
            },
        );
        true
    }

    /// Cancel any timer armed for `id` and hold its slot without spawning
    /// anything.
    ///
    /// The returned generation goes stale as soon as the endpoint is
    /// cancelled or armed again, which lets async work started outside a
    /// timer task check with [`release`](Self::release) whether its result
    /// still counts.  `None` once the scheduler has been shut down.
    pub fn reserve(&self, id: EndpointId, kind: TimerKind) -> Option<u64> {
        let mut timers = self.lock();
        let generation = Self::supersede(&mut timers, id)?;
        timers.entries.insert(
            id,
            TimerEntry {
                generation,
                kind,
                handle: None,
            },
        );
        Some(generation)
    }

    fn supersede(timers: &mut Timers, id: EndpointId) -> Option<u64> {
        if timers.shut_down {
            return None;
        }
        if let Some(previous) = timers.entries.remove(&id) {
            previous.abort();
        }
        timers.next_generation += 1;
        Some(timers.next_generation)
    }

    /// Take the slot `generation` holds out of the map.
    ///
    /// Returns `false` when the slot now belongs to a newer arm (or was
    /// cancelled), in which case the caller must drop whatever it computed.
    /// The released task is no longer abortable through the scheduler, so
    /// the caller can re-arm the endpoint without cancelling itself.
    pub fn release(&self, id: EndpointId, generation: u64) -> bool {
        let mut timers = self.lock();
        match timers.entries.get(&id) {
            Some(entry) if entry.generation == generation => {
                timers.entries.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Whether `generation` is still the armed timer for `id`.
    pub fn is_current(&self, id: EndpointId, generation: u64) -> bool {
        self.lock()
            .entries
            .get(&id)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// Abort the timer for `id`, if any.
    pub fn cancel(&self, id: EndpointId) -> bool {
        match self.lock().entries.remove(&id) {
            Some(entry) => {
                entry.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every timer and refuse further arms.  Returns how many timers
    /// were cancelled.
    pub fn shutdown(&self) -> usize {
        let mut timers = self.lock();
        timers.shut_down = true;
        let cancelled = timers.entries.len();
        for (_, entry) in timers.entries.drain() {
            entry.abort();
        }
        cancelled
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    /// Kind of the timer currently armed for `id`.
    pub fn armed(&self, id: EndpointId) -> Option<TimerKind> {
        self.lock().entries.get(&id).map(|entry| entry.kind)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ID: EndpointId = EndpointId(7);

    type TimerTask = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    fn counting_timer(fired: &Arc<AtomicUsize>, after: Duration) -> impl FnOnce(u64) -> TimerTask {
        let fired = Arc::clone(fired);
        move |_generation| -> TimerTask {
            Box::pin(async move {
                tokio::time::sleep(after).await;
                fired.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn armed_timer_fires() {
        let scheduler = LivenessScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        assert!(scheduler.arm(ID, TimerKind::Probe, counting_timer(&fired, Duration::from_secs(10))));
        assert_eq!(scheduler.armed(ID), Some(TimerKind::Probe));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_cancels_previous_timer() {
        let scheduler = LivenessScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler.arm(ID, TimerKind::Probe, counting_timer(&fired, Duration::from_secs(10)));
        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.arm(ID, TimerKind::Probe, counting_timer(&fired, Duration::from_secs(10)));
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await; // t = 11: first timer would have fired
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await; // t = 16
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn release_rejects_stale_generation() {
        let scheduler = LivenessScheduler::new();
        let generations = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let generations = Arc::clone(&generations);
            scheduler.arm(ID, TimerKind::Probe, move |generation| {
                generations.lock().unwrap().push(generation);
                std::future::pending::<()>()
            });
        }
        let (stale, current) = {
            let g = generations.lock().unwrap();
            (g[0], g[1])
        };
        assert!(!scheduler.is_current(ID, stale));
        assert!(!scheduler.release(ID, stale));
        assert!(scheduler.is_current(ID, current));
        assert!(scheduler.release(ID, current));
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn released_slot_survives_until_work_finishes() {
        let scheduler = Arc::new(LivenessScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let task_scheduler = Arc::clone(&scheduler);
        let task_fired = Arc::clone(&fired);
        scheduler.arm(ID, TimerKind::Probe, move |generation| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            // Slow work while still holding the slot.
            tokio::time::sleep(Duration::from_secs(5)).await;
            if task_scheduler.release(ID, generation) {
                task_fired.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(scheduler.armed(ID), Some(TimerKind::Probe));
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_slow_work_drops_the_result() {
        let scheduler = Arc::new(LivenessScheduler::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let task_scheduler = Arc::clone(&scheduler);
        let task_fired = Arc::clone(&fired);
        scheduler.arm(ID, TimerKind::Probe, move |generation| async move {
            tokio::time::sleep(Duration::from_secs(6)).await;
            if task_scheduler.release(ID, generation) {
                task_fired.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(scheduler.cancel(ID));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reservation_goes_stale_on_cancel_or_arm() {
        let scheduler = LivenessScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let held = scheduler.reserve(ID, TimerKind::Probe).expect("not shut down");
        assert_eq!(scheduler.armed(ID), Some(TimerKind::Probe));
        assert!(scheduler.release(ID, held));

        let cancelled = scheduler.reserve(ID, TimerKind::Probe).expect("not shut down");
        scheduler.cancel(ID);
        assert!(!scheduler.release(ID, cancelled));

        let superseded = scheduler.reserve(ID, TimerKind::Probe).expect("not shut down");
        scheduler.arm(ID, TimerKind::Passive, counting_timer(&fired, Duration::from_secs(1)));
        assert!(!scheduler.release(ID, superseded));
        assert_eq!(scheduler.armed(ID), Some(TimerKind::Passive));

        scheduler.shutdown();
        assert_eq!(scheduler.reserve(ID, TimerKind::Probe), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_timer() {
        let scheduler = LivenessScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler.arm(ID, TimerKind::Passive, counting_timer(&fired, Duration::from_secs(1)));
        assert!(scheduler.cancel(ID));
        assert!(!scheduler.cancel(ID));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_all_and_blocks_new_arms() {
        let scheduler = LivenessScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler.arm(EndpointId(1), TimerKind::Probe, counting_timer(&fired, Duration::from_secs(1)));
        scheduler.arm(EndpointId(2), TimerKind::Passive, counting_timer(&fired, Duration::from_secs(1)));

        assert_eq!(scheduler.shutdown(), 2);
        assert!(scheduler.is_shut_down());
        assert!(!scheduler.arm(EndpointId(3), TimerKind::Probe, counting_timer(&fired, Duration::from_secs(1))));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_empty());
    }
}
