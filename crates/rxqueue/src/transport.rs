//! FIFO transports the packet queue is layered on.
//!
//! A transport is an unbounded concurrent FIFO with a fixed number of writer
//! lanes and one reader. The queue picks the implementation through its type
//! parameter, so the writer cardinality is fixed for the queue's lifetime and
//! never branched on per call.

use crate::invariants::debug_assert_lane;
use crate::lane::Lane;
use std::cell::UnsafeCell;

/// Unbounded FIFO with `writers()` producer lanes and a single consumer.
///
/// Items enqueued through the same lane are dequeued in order. No order is
/// promised between lanes.
pub trait Transport<T>: Send + Sync {
    /// Largest writer count this transport supports.
    const MAX_WRITERS: usize;

    /// Creates an empty transport with `writers` lanes whose segments hold
    /// `2^segment_bits` items.
    fn with_writers(writers: usize, segment_bits: u8) -> Self;

    /// Number of producer lanes.
    fn writers(&self) -> usize;

    /// Appends `value` to `lane`. Never fails.
    ///
    /// # Safety
    ///
    /// `lane < self.writers()`, and at most one thread enqueues into a given
    /// lane at a time (a new thread taking over a lane must be ordered after
    /// the previous one by a happens-before edge).
    unsafe fn enqueue(&self, lane: usize, value: T);

    /// Removes the next value, if any lane has one.
    ///
    /// # Safety
    ///
    /// At most one thread dequeues at a time.
    unsafe fn dequeue(&self) -> Option<T>;
}

// =============================================================================
// Single writer
// =============================================================================

/// Single-writer single-reader transport.
pub struct OneOneQueue<T> {
    lane: Lane<T>,
}

impl<T: Send> Transport<T> for OneOneQueue<T> {
    const MAX_WRITERS: usize = 1;

    fn with_writers(writers: usize, segment_bits: u8) -> Self {
        debug_assert!(writers <= Self::MAX_WRITERS);
        Self {
            lane: Lane::new(1 << segment_bits),
        }
    }

    #[inline]
    fn writers(&self) -> usize {
        1
    }

    #[inline]
    unsafe fn enqueue(&self, lane: usize, value: T) {
        debug_assert_lane!(lane, 1);
        // SAFETY: forwarded from the caller.
        unsafe { self.lane.push(value) }
    }

    #[inline]
    unsafe fn dequeue(&self) -> Option<T> {
        // SAFETY: forwarded from the caller.
        unsafe { self.lane.pop() }
    }
}

// =============================================================================
// Many writers
// =============================================================================

/// N-writer single-reader transport using lane decomposition.
///
/// Each writer gets a dedicated SPSC lane, eliminating producer-producer
/// contention. The reader scans lanes round-robin starting after the lane it
/// last took an item from.
pub struct ManyOneQueue<T> {
    lanes: Box<[Lane<T>]>,
    /// Next lane to scan (reader-only)
    cursor: UnsafeCell<usize>,
}

// Safety: lanes are Send + Sync for T: Send; `cursor` is only touched by the
// single reader under the `dequeue` contract.
unsafe impl<T: Send> Send for ManyOneQueue<T> {}
unsafe impl<T: Send> Sync for ManyOneQueue<T> {}

impl<T: Send> Transport<T> for ManyOneQueue<T> {
    const MAX_WRITERS: usize = usize::MAX;

    fn with_writers(writers: usize, segment_bits: u8) -> Self {
        let lanes = (0..writers.max(1))
            .map(|_| Lane::new(1 << segment_bits))
            .collect();
        Self {
            lanes,
            cursor: UnsafeCell::new(0),
        }
    }

    #[inline]
    fn writers(&self) -> usize {
        self.lanes.len()
    }

    #[inline]
    unsafe fn enqueue(&self, lane: usize, value: T) {
        debug_assert_lane!(lane, self.lanes.len());
        // SAFETY: forwarded from the caller.
        unsafe { self.lanes[lane].push(value) }
    }

    unsafe fn dequeue(&self) -> Option<T> {
        // SAFETY: the cursor is reader-only and the caller guarantees one reader.
        let cursor = unsafe { &mut *self.cursor.get() };
        let count = self.lanes.len();

        for offset in 0..count {
            let idx = (*cursor + offset) % count;
            // SAFETY: forwarded from the caller.
            if let Some(value) = unsafe { self.lanes[idx].pop() } {
                *cursor = (idx + 1) % count;
                return Some(value);
            }
        }
        None
    }
}
