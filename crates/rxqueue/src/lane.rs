//! Unbounded SPSC lane built from linked ring segments.
//!
//! The producer appends to the tail segment. When that segment is full it
//! allocates a fresh one, stores the value in it, and only then links it, so
//! the consumer never sees an empty successor. The producer never touches a
//! segment again after linking past it.
//!
//! The consumer drains the head segment. Once it finds the segment empty and a
//! successor linked, it checks the segment once more (everything pushed before
//! the link is visible after the Acquire load of `next`), frees it and moves on.
//! Segments are therefore freed only by the consumer and only after the
//! producer has left them.

use crate::invariants::debug_assert_drained_segment;
use crate::ring::Segment;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;

pub(crate) struct Lane<T> {
    /// Oldest live segment (consumer-only)
    head: CachePadded<UnsafeCell<*mut Segment<T>>>,
    /// Segment the producer is filling (producer-only)
    tail: CachePadded<UnsafeCell<*mut Segment<T>>>,
    segment_capacity: usize,
}

// Safety: the raw segment pointers are owned by the lane; the single-producer
// and single-consumer contracts on `push`/`pop` keep each side's pointer
// private to one thread at a time.
unsafe impl<T: Send> Send for Lane<T> {}
unsafe impl<T: Send> Sync for Lane<T> {}

impl<T> Lane<T> {
    pub(crate) fn new(segment_capacity: usize) -> Self {
        let first = Segment::allocate(segment_capacity);
        Self {
            head: CachePadded::new(UnsafeCell::new(first)),
            tail: CachePadded::new(UnsafeCell::new(first)),
            segment_capacity,
        }
    }

    /// Appends `value`. Never fails; grows by one segment when full.
    ///
    /// # Safety
    ///
    /// At most one thread may push into a lane at a time, and a change of
    /// pushing thread must be ordered by a happens-before edge.
    pub(crate) unsafe fn push(&self, value: T) {
        // SAFETY: tail is producer-only and the caller guarantees a single producer.
        let tail = unsafe { &mut *self.tail.get() };
        let current = *tail;
        // SAFETY: the tail segment stays alive until the consumer sees a
        // successor, which only this function links.
        let segment = unsafe { &*current };

        let value = match unsafe { segment.try_push(value) } {
            Ok(()) => return,
            Err(value) => value,
        };

        let fresh = Segment::allocate(self.segment_capacity);
        // SAFETY: nobody else can reach `fresh` until it is linked below.
        unsafe {
            if (*fresh).try_push(value).is_err() {
                unreachable!("fresh segment rejected a push");
            }
            segment.link(fresh);
        }
        *tail = fresh;
    }

    /// Removes the oldest value, if any.
    ///
    /// # Safety
    ///
    /// At most one thread may pop from a lane at a time, and a change of
    /// popping thread must be ordered by a happens-before edge.
    pub(crate) unsafe fn pop(&self) -> Option<T> {
        // SAFETY: head is consumer-only and the caller guarantees a single consumer.
        let head = unsafe { &mut *self.head.get() };
        loop {
            let current = *head;
            // SAFETY: the consumer owns the head segment's lifetime.
            let segment = unsafe { &*current };
            if let Some(value) = unsafe { segment.try_pop() } {
                return Some(value);
            }

            let next = segment.next();
            if next.is_null() {
                return None;
            }

            // The producer linked `next` after its last push here; the
            // Acquire above makes those pushes visible to this re-check.
            if let Some(value) = unsafe { segment.try_pop() } {
                return Some(value);
            }

            let (seg_head, seg_tail) = segment.bounds();
            debug_assert_drained_segment!(seg_head, seg_tail);

            // SAFETY: the segment is empty, the producer has moved to `next`
            // and never returns, and only the consumer frees segments.
            unsafe { drop(Box::from_raw(current)) };
            *head = next;
        }
    }
}

impl<T> Drop for Lane<T> {
    fn drop(&mut self) {
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            // SAFETY: `&mut self` means no producer or consumer is active;
            // every segment from head onwards is live and owned by the lane.
            let segment = unsafe { Box::from_raw(current) };
            current = segment.next();
            drop(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lane_grows_past_segment() {
        let lane = Lane::<u32>::new(4);
        unsafe {
            for i in 0..37 {
                lane.push(i);
            }
            for i in 0..37 {
                assert_eq!(lane.pop(), Some(i));
            }
            assert_eq!(lane.pop(), None);

            // Still usable after retiring segments
            lane.push(100);
            assert_eq!(lane.pop(), Some(100));
        }
    }

    #[test]
    fn test_lane_interleaved_push_pop() {
        let lane = Lane::<u32>::new(2);
        let mut expected = 0;
        let mut next = 0;
        unsafe {
            for round in 0..50 {
                for _ in 0..(round % 5) {
                    lane.push(next);
                    next += 1;
                }
                for _ in 0..(round % 3) {
                    if let Some(v) = lane.pop() {
                        assert_eq!(v, expected);
                        expected += 1;
                    }
                }
            }
            while let Some(v) = lane.pop() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        assert_eq!(expected, next);
    }

    #[test]
    fn test_lane_drop_releases_every_segment() {
        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct DropTracker;

        impl Drop for DropTracker {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        DROP_COUNT.store(0, Ordering::SeqCst);
        let lane = Lane::<DropTracker>::new(4);
        unsafe {
            for _ in 0..10 {
                lane.push(DropTracker);
            }
            // Consume across the first segment boundary
            for _ in 0..5 {
                drop(lane.pop());
            }
        }
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 5);

        drop(lane);
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_lane_cross_thread_fifo() {
        const N: u64 = 100_000;
        let lane = Arc::new(Lane::<u64>::new(16));

        let producer = {
            let lane = Arc::clone(&lane);
            thread::spawn(move || {
                for i in 0..N {
                    unsafe { lane.push(i) };
                }
            })
        };

        let mut expected = 0;
        while expected < N {
            match unsafe { lane.pop() } {
                Some(v) => {
                    assert_eq!(v, expected, "FIFO violation");
                    expected += 1;
                }
                None => thread::yield_now(),
            }
        }

        producer.join().unwrap();
        assert_eq!(unsafe { lane.pop() }, None);
    }
}
