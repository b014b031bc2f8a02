//! Level-triggered wait signal for an idle consumer.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

// =============================================================================
// ORDERING
// =============================================================================
//
// `raise` and `clear` are both read-modify-writes with AcqRel ordering. A
// producer publishes its entry with a Release store and then raises; the
// consumer clears and then dequeues again. If the clear lands after a raise in
// the flag's modification order, the clear reads from that raise (or a later
// raise in its release sequence) and therefore synchronizes with it, so the
// re-check dequeue sees every entry published before the overwritten raise.
// If the clear lands first, the flag simply ends up raised.
//
// Waiters check the flag under `lock`; the first raise after a clear takes the
// same lock before notifying, so a waiter can never miss the transition
// between its check and its park.
//
// =============================================================================

/// A binary, level-triggered flag with a blocking wait (a manual-reset event).
///
/// The queue only calls [`raise`](Self::raise) and [`clear`](Self::clear);
/// waiting is up to the caller, typically the consumer after `pop` returned
/// `None`. Waits may wake spuriously, never late.
#[derive(Debug, Default)]
pub struct WaitSignal {
    raised: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl WaitSignal {
    /// Creates a cleared signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes all waiters. Idempotent.
    #[inline]
    pub fn raise(&self) {
        if !self.raised.swap(true, Ordering::AcqRel) {
            let _guard = self.lock.lock();
            self.cond.notify_all();
        }
    }

    /// Resets the flag; later waits block until the next `raise`.
    #[inline]
    pub fn clear(&self) {
        self.raised.swap(false, Ordering::AcqRel);
    }

    /// Returns true if the flag is set.
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Blocks until the flag is set. Returns immediately if it already is.
    pub fn wait(&self) {
        if self.is_raised() {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.is_raised() {
            self.cond.wait(&mut guard);
        }
    }

    /// Blocks until the flag is set or `timeout` elapses.
    ///
    /// Returns `true` if the flag was observed set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_deadline(deadline),
            None => {
                self.wait();
                true
            }
        }
    }

    /// Blocks until the flag is set or `deadline` passes.
    ///
    /// Returns `true` if the flag was observed set.
    pub fn wait_deadline(&self, deadline: Instant) -> bool {
        if self.is_raised() {
            return true;
        }
        let mut guard = self.lock.lock();
        while !self.is_raised() {
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                return self.is_raised();
            }
        }
        true
    }
}
