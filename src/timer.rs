//! Single-owner delayed actions with cancel-and-replace semantics.
//!
//! The service never spawns threads. The owner polls [`TimerService::take_due`]
//! from its own loop, so every payload is delivered on the thread that owns
//! the service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source, injectable so timing can be driven by hand in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when [`ManualClock::advance`] is called.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.base + offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerTag {
    HideAfterIdle,
    EdgeRecheck,
}

/// Opaque handle to a scheduled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    id: u64,
    tag: TimerTag,
    deadline: Instant,
}

impl TimerHandle {
    pub fn tag(&self) -> TimerTag {
        self.tag
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

struct Pending<T> {
    handle: TimerHandle,
    payload: T,
}

pub struct TimerService<T> {
    clock: Arc<dyn Clock>,
    next_id: u64,
    pending: HashMap<TimerTag, Pending<T>>,
    closed: bool,
}

impl<T> TimerService<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: 1,
            pending: HashMap::new(),
            closed: false,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Schedule `payload` to become due after `delay`, replacing any pending
    /// action with the same tag. After [`shutdown`](Self::shutdown) the
    /// returned handle is inert and never becomes due.
    pub fn schedule(&mut self, tag: TimerTag, delay: Duration, payload: T) -> TimerHandle {
        let handle = TimerHandle {
            id: self.next_id,
            tag,
            deadline: self.clock.now() + delay,
        };
        self.next_id += 1;
        if self.closed {
            tracing::debug!(?tag, "timer service closed; schedule ignored");
            return handle;
        }
        if let Some(old) = self.pending.insert(tag, Pending { handle, payload }) {
            tracing::trace!(?tag, replaced = old.handle.id, "timer replaced");
        }
        handle
    }

    /// Cancel a handle. Already-fired or already-cancelled handles are ignored.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.pending.get(&handle.tag) {
            Some(p) if p.handle.id == handle.id => {
                self.pending.remove(&handle.tag);
                true
            }
            _ => false,
        }
    }

    pub fn cancel_tag(&mut self, tag: TimerTag) -> bool {
        self.pending.remove(&tag).is_some()
    }

    pub fn is_pending(&self, tag: TimerTag) -> bool {
        self.pending.contains_key(&tag)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.handle.deadline).min()
    }

    /// Remove and return every action whose deadline has passed, earliest first.
    pub fn take_due(&mut self) -> Vec<(TimerHandle, T)> {
        let now = self.clock.now();
        let due: Vec<TimerTag> = self
            .pending
            .iter()
            .filter(|(_, p)| p.handle.deadline <= now)
            .map(|(tag, _)| *tag)
            .collect();
        let mut fired: Vec<(TimerHandle, T)> = due
            .into_iter()
            .filter_map(|tag| self.pending.remove(&tag))
            .map(|p| (p.handle, p.payload))
            .collect();
        fired.sort_by_key(|(handle, _)| (handle.deadline, handle.id));
        fired
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Cancel everything and refuse further scheduling.
    pub fn shutdown(&mut self) -> usize {
        self.closed = true;
        self.cancel_all()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (ManualClock, TimerService<&'static str>) {
        let clock = ManualClock::default();
        let svc = TimerService::new(Arc::new(clock.clone()));
        (clock, svc)
    }

    #[test]
    fn fires_after_delay_only() {
        let (clock, mut svc) = service();
        svc.schedule(TimerTag::HideAfterIdle, Duration::from_millis(100), "hide");
        clock.advance(Duration::from_millis(99));
        assert!(svc.take_due().is_empty());
        clock.advance(Duration::from_millis(1));
        let fired = svc.take_due();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1, "hide");
        assert!(!svc.is_pending(TimerTag::HideAfterIdle));
    }

    #[test]
    fn same_tag_replaces_previous() {
        let (clock, mut svc) = service();
        let first = svc.schedule(TimerTag::HideAfterIdle, Duration::from_millis(10), "first");
        svc.schedule(TimerTag::HideAfterIdle, Duration::from_millis(20), "second");
        assert!(!svc.cancel(first));
        clock.advance(Duration::from_millis(50));
        let fired: Vec<_> = svc.take_due().into_iter().map(|(_, p)| p).collect();
        assert_eq!(fired, vec!["second"]);
    }

    #[test]
    fn different_tags_coexist_and_fire_in_deadline_order() {
        let (clock, mut svc) = service();
        svc.schedule(TimerTag::HideAfterIdle, Duration::from_millis(30), "hide");
        svc.schedule(TimerTag::EdgeRecheck, Duration::from_millis(10), "recheck");
        assert_eq!(svc.next_deadline(), Some(clock.now() + Duration::from_millis(10)));
        clock.advance(Duration::from_millis(30));
        let fired: Vec<_> = svc.take_due().into_iter().map(|(_, p)| p).collect();
        assert_eq!(fired, vec!["recheck", "hide"]);
    }

    #[test]
    fn cancel_is_a_noop_on_stale_handles() {
        let (clock, mut svc) = service();
        let h = svc.schedule(TimerTag::EdgeRecheck, Duration::from_millis(5), "x");
        assert!(svc.cancel(h));
        assert!(!svc.cancel(h));
        let h = svc.schedule(TimerTag::EdgeRecheck, Duration::from_millis(5), "y");
        clock.advance(Duration::from_millis(5));
        assert_eq!(svc.take_due().len(), 1);
        assert!(!svc.cancel(h));
    }

    #[test]
    fn shutdown_cancels_and_closes() {
        let (clock, mut svc) = service();
        svc.schedule(TimerTag::EdgeRecheck, Duration::from_millis(5), "a");
        svc.schedule(TimerTag::HideAfterIdle, Duration::from_millis(5), "b");
        assert_eq!(svc.shutdown(), 2);
        svc.schedule(TimerTag::EdgeRecheck, Duration::from_millis(1), "late");
        clock.advance(Duration::from_secs(1));
        assert!(svc.take_due().is_empty());
        assert!(svc.next_deadline().is_none());
    }
}
