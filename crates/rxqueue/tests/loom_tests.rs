//! Loom-based concurrency tests for the receive queue protocols.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Each test rebuilds one synchronization protocol in miniature on loom's
//! atomics, small enough for loom to explore every interleaving:
//! - clear-then-recheck on the wait signal (no lost wake-up)
//! - segment linking in a lane (no item skipped on segment hand-off)
//! - counter increment before publish (occupancy never goes negative)

#![cfg(feature = "loom")]

use loom::cell::UnsafeCell;
use loom::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

/// One-slot SPSC cell: the smallest transport that still publishes with
/// Release and observes with Acquire.
struct LoomSlot {
    tail: AtomicU64,
    head: AtomicU64,
    value: UnsafeCell<u64>,
}

unsafe impl Send for LoomSlot {}
unsafe impl Sync for LoomSlot {}

impl LoomSlot {
    fn new() -> Self {
        Self {
            tail: AtomicU64::new(0),
            head: AtomicU64::new(0),
            value: UnsafeCell::new(0),
        }
    }

    fn push(&self, value: u64) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail != self.head.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: the slot is empty, so the consumer is not reading it
        self.value.with_mut(|p| unsafe { *p = value });
        self.tail.store(tail + 1, Ordering::Release);
        true
    }

    fn pop(&self) -> Option<u64> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the slot was published by the Release store of tail
        let value = self.value.with(|p| unsafe { *p });
        self.head.store(head + 1, Ordering::Release);
        Some(value)
    }
}

/// Wait flag with the same read-modify-write orderings as `WaitSignal`.
struct LoomFlag {
    raised: AtomicBool,
}

impl LoomFlag {
    fn raise(&self) {
        self.raised.swap(true, Ordering::AcqRel);
    }

    fn clear(&self) {
        self.raised.swap(false, Ordering::AcqRel);
    }
}

/// After an empty pop the consumer either got the item on its re-check or
/// the flag is left raised, so waiting on it cannot hang.
#[test]
fn loom_clear_recheck_never_loses_wakeup() {
    loom::model(|| {
        let slot = Arc::new(LoomSlot::new());
        let flag = Arc::new(LoomFlag {
            raised: AtomicBool::new(false),
        });

        let producer = {
            let slot = Arc::clone(&slot);
            let flag = Arc::clone(&flag);
            thread::spawn(move || {
                assert!(slot.push(7));
                flag.raise();
            })
        };

        let consumer = {
            let slot = Arc::clone(&slot);
            let flag = Arc::clone(&flag);
            thread::spawn(move || match slot.pop() {
                Some(v) => Some(v),
                None => {
                    flag.clear();
                    let v = slot.pop()?;
                    flag.raise();
                    Some(v)
                }
            })
        };

        producer.join().unwrap();
        let got = consumer.join().unwrap();

        let raised = flag.raised.load(Ordering::Acquire);
        assert!(
            got == Some(7) || raised,
            "item pending with the flag cleared"
        );
        if got.is_none() {
            // The item must still be there for the woken consumer
            assert_eq!(slot.pop(), Some(7));
        }
    });
}

/// Producer fills segment A, writes the overflow into B and only then links
/// A to B. A consumer that sees the link must still find A's item first.
#[test]
fn loom_segment_link_handoff_keeps_order() {
    loom::model(|| {
        let first = Arc::new(LoomSlot::new());
        let second = Arc::new(LoomSlot::new());
        // 0 = no successor yet, 1 = linked to `second`
        let next = Arc::new(AtomicUsize::new(0));

        let producer = {
            let first = Arc::clone(&first);
            let second = Arc::clone(&second);
            let next = Arc::clone(&next);
            thread::spawn(move || {
                assert!(first.push(1));
                // `first` is full: spill into a fresh segment, then link it
                assert!(!first.push(2));
                assert!(second.push(2));
                next.store(1, Ordering::Release);
            })
        };

        let consumer = {
            let first = Arc::clone(&first);
            let second = Arc::clone(&second);
            let next = Arc::clone(&next);
            thread::spawn(move || {
                let mut received = Vec::new();
                let mut on_first = true;
                for _ in 0..3 {
                    if on_first {
                        if let Some(v) = first.pop() {
                            received.push(v);
                            continue;
                        }
                        if next.load(Ordering::Acquire) == 0 {
                            thread::yield_now();
                            continue;
                        }
                        // Linked: everything pushed into `first` is visible now
                        if let Some(v) = first.pop() {
                            received.push(v);
                        }
                        on_first = false;
                    }
                    if let Some(v) = second.pop() {
                        received.push(v);
                    }
                }
                received
            })
        };

        producer.join().unwrap();
        let received = consumer.join().unwrap();

        let expected = [1, 2];
        assert_eq!(received[..], expected[..received.len()]);
    });
}

/// Counters are bumped before the entry is published, so the consumer's
/// decrement can never take occupancy below zero.
#[test]
fn loom_counter_never_underflows() {
    loom::model(|| {
        let slot = Arc::new(LoomSlot::new());
        let count = Arc::new(AtomicI64::new(0));

        let producer = {
            let slot = Arc::clone(&slot);
            let count = Arc::clone(&count);
            thread::spawn(move || {
                count.fetch_add(1, Ordering::Relaxed);
                assert!(slot.push(5));
            })
        };

        let consumer = {
            let slot = Arc::clone(&slot);
            let count = Arc::clone(&count);
            thread::spawn(move || {
                if slot.pop().is_some() {
                    let after = count.fetch_sub(1, Ordering::Relaxed) - 1;
                    assert!(after >= 0, "occupancy went negative: {}", after);
                    true
                } else {
                    false
                }
            })
        };

        producer.join().unwrap();
        let popped = consumer.join().unwrap();
        let expected = if popped { 0 } else { 1 };
        assert_eq!(count.load(Ordering::Relaxed), expected);
    });
}
