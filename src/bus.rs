//! Single-producer, multi-consumer frame broker.
//!
//! The capture thread publishes one `Arc<Published>` per completed frame. Subscribers
//! block on a condition variable until a newer sequence number is available. This is
//! broadcast, not a queue: a slow subscriber that misses several publishes simply
//! wakes up to the latest one, and the producer never waits on anybody.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::frame::Published;

#[derive(Default)]
struct BusState {
    latest: Option<Arc<Published>>,
    published: u64,
    closed: bool,
}

impl BusState {
    fn latest_seq(&self) -> u64 {
        self.latest.as_ref().map_or(0, |p| p.seq())
    }
}

#[derive(Default)]
pub struct FrameBus {
    state: Mutex<BusState>,
    signal: Condvar,
}

impl FrameBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // Writers only swap an Arc and bump counters, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a fully built snapshot and wake every waiting subscriber.
    ///
    /// Returns `false` (and drops the snapshot) if its sequence number does not move
    /// forward or the bus is closed.
    pub fn publish(&self, published: Published) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        let seq = published.seq();
        if seq <= state.latest_seq() {
            log::warn!(
                "dropping out-of-order frame seq={} (latest={})",
                seq,
                state.latest_seq()
            );
            return false;
        }
        state.latest = Some(Arc::new(published));
        state.published += 1;
        drop(state);
        self.signal.notify_all();
        true
    }

    pub fn latest(&self) -> Option<Arc<Published>> {
        self.lock().latest.clone()
    }

    pub fn published_count(&self) -> u64 {
        self.lock().published
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close the bus. All current and future waits return `None`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.signal.notify_all();
    }

    /// Subscribe to frames published after this call.
    pub fn subscribe(self: &Arc<Self>) -> Subscriber {
        let last_seen = self.lock().latest_seq();
        Subscriber {
            bus: self.clone(),
            last_seen,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// A consumer's position on the bus.
pub struct Subscriber {
    bus: Arc<FrameBus>,
    last_seen: u64,
    cancelled: Arc<AtomicBool>,
}

impl Subscriber {
    /// Block until a frame newer than the last one returned is published.
    ///
    /// Returns `None` once the subscriber is cancelled or the bus is closed. Waiting
    /// does not poll: the thread sleeps on the bus condition variable.
    pub fn next(&mut self) -> Option<Arc<Published>> {
        let last_seen = self.last_seen;
        let cancelled = &self.cancelled;
        let state = self
            .bus
            .signal
            .wait_while(self.bus.lock(), |state| {
                !state.closed
                    && !cancelled.load(Ordering::SeqCst)
                    && state.latest_seq() <= last_seen
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed || cancelled.load(Ordering::SeqCst) {
            return None;
        }
        let latest = state.latest.clone()?;
        self.last_seen = latest.seq();
        Some(latest)
    }

    /// Non-blocking variant of `next`.
    pub fn try_next(&mut self) -> Option<Arc<Published>> {
        let state = self.bus.lock();
        if state.closed || self.is_cancelled() {
            return None;
        }
        let latest = state.latest.clone()?;
        if latest.seq() <= self.last_seen {
            return None;
        }
        self.last_seen = latest.seq();
        Some(latest)
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Handle another thread can use to interrupt a blocked `next`.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            bus: self.bus.clone(),
            cancelled: self.cancelled.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CancelHandle {
    bus: Arc<FrameBus>,
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Taking the lock orders the flag store before any waiter's predicate check.
        let _state = self.bus.lock();
        self.bus.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
