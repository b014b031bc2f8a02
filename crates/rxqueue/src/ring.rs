use crate::invariants::debug_assert_bounded_count;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// A `Segment` is a fixed-size SPSC ring. Lanes chain segments into an
// unbounded queue (see lane.rs); this file only deals with one ring.
//
// ## Sequence Numbers
//
// `head` and `tail` are unbounded u64 sequence numbers; the slot index is
// `sequence & mask`. Wrap-around of the counters themselves is not a concern.
//
// ## Memory Ordering Protocol
//
// **Producer (`try_push`):**
// 1. Load `tail` with Relaxed (only the producer writes tail)
// 2. Check free space against `cached_head` (UnsafeCell, producer-only)
// 3. If the cache says full: load `head` with Acquire and refresh the cache
// 4. Write the slot
// 5. Store `tail + 1` with Release (publishes the slot to the consumer)
//
// **Consumer (`try_pop`):**
// 1. Load `head` with Relaxed (only the consumer writes head)
// 2. Check availability against `cached_tail` (UnsafeCell, consumer-only)
// 3. If the cache says empty: load `tail` with Acquire and refresh the cache
// 4. Move the value out of the slot
// 5. Store `head + 1` with Release (hands the slot back to the producer)
//
// ## Single-Writer Invariants
//
// - `cached_head`: written and read by the producer only
// - `cached_tail`: written and read by the consumer only
// - `buffer[idx]`: written by the producer while `idx` is outside
//   `[head, tail)`, read by the consumer while it is inside
//
// The lane that owns a segment guarantees one producer and one consumer at a
// time; the queue handles guarantee that for lanes.
//
// =============================================================================

/// SPSC ring segment - the transport's building block.
///
/// Optimized with:
/// - Cache-padded indices to prevent false sharing
/// - Cached sequence numbers to minimize cross-core traffic
pub(crate) struct Segment<T> {
    // === PRODUCER HOT ===
    /// Tail index (written by producer, read by consumer)
    tail: CachePadded<AtomicU64>,
    /// Producer's cached view of head (avoids cross-core reads)
    cached_head: CachePadded<UnsafeCell<u64>>,

    // === CONSUMER HOT ===
    /// Head index (written by consumer, read by producer)
    head: CachePadded<AtomicU64>,
    /// Consumer's cached view of tail (avoids cross-core reads)
    cached_tail: CachePadded<UnsafeCell<u64>>,

    // === LINK ===
    /// Successor segment, set once by the producer when this one fills up
    next: AtomicPtr<Segment<T>>,

    mask: usize,

    /// Fixed-size slot storage; never grows or shrinks.
    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

// Safety: Segment is Send + Sync as long as T is Send
// The atomic operations ensure proper synchronization
unsafe impl<T: Send> Send for Segment<T> {}
unsafe impl<T: Send> Sync for Segment<T> {}

impl<T> Segment<T> {
    /// Creates an empty segment with `capacity` slots (a power of two).
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());

        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);

        Self {
            tail: CachePadded::new(AtomicU64::new(0)),
            cached_head: CachePadded::new(UnsafeCell::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
            cached_tail: CachePadded::new(UnsafeCell::new(0)),
            next: AtomicPtr::new(ptr::null_mut()),
            mask: capacity - 1,
            buffer: UnsafeCell::new(buffer.into_boxed_slice()),
        }
    }

    /// Allocates a segment on the heap and leaks it as a raw pointer.
    ///
    /// Ownership is reclaimed with `Box::from_raw` by the lane that links it.
    pub(crate) fn allocate(capacity: usize) -> *mut Self {
        Box::into_raw(Box::new(Self::new(capacity)))
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    /// Returns the number of slots.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Returns the current number of items (a racy snapshot).
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Appends `value`, or hands it back if every slot is in use.
    ///
    /// # Safety
    ///
    /// Only one thread may call `try_push` (or `link`) on a segment at a time.
    pub(crate) unsafe fn try_push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);

        // Fast path: check cached head
        // SAFETY: cached_head is only touched by the single producer.
        let cached_head = unsafe { *self.cached_head.get() };
        if tail.wrapping_sub(cached_head) as usize >= self.capacity() {
            // Slow path: refresh cache
            let head = self.head.load(Ordering::Acquire);
            // SAFETY: as above; the Acquire load synchronizes with the
            // consumer's Release store of head, so the slot is free.
            unsafe { *self.cached_head.get() = head };
            if tail.wrapping_sub(head) as usize >= self.capacity() {
                return Err(value);
            }
        }

        let idx = (tail as usize) & self.mask;
        // SAFETY: Buffer access is safe because:
        // 1. idx is within bounds (masked to capacity)
        // 2. The slot is outside [head, tail), so the consumer is not reading it
        // 3. Only the producer writes slots, and it is this thread
        unsafe {
            let buffer = &mut *self.buffer.get();
            buffer[idx].write(value);
        }

        let new_tail = tail.wrapping_add(1);
        debug_assert_bounded_count!(
            new_tail.wrapping_sub(self.head.load(Ordering::Relaxed)) as usize,
            self.capacity()
        );
        self.tail.store(new_tail, Ordering::Release);
        Ok(())
    }

    /// Publishes `next` as this segment's successor.
    ///
    /// # Safety
    ///
    /// Producer-side only, at most once per segment, after the producer's
    /// final `try_push` on this segment.
    pub(crate) unsafe fn link(&self, next: *mut Segment<T>) {
        debug_assert!(self.next.load(Ordering::Relaxed).is_null());
        self.next.store(next, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Removes the oldest item, if any.
    ///
    /// # Safety
    ///
    /// Only one thread may call `try_pop` on a segment at a time.
    pub(crate) unsafe fn try_pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);

        // Fast path: check cached tail
        // SAFETY: cached_tail is only touched by the single consumer.
        let cached_tail = unsafe { *self.cached_tail.get() };
        if cached_tail == head {
            // Slow path: refresh cache
            let tail = self.tail.load(Ordering::Acquire);
            // SAFETY: as above; the Acquire load synchronizes with the
            // producer's Release store of tail.
            unsafe { *self.cached_tail.get() = tail };
            if tail == head {
                return None;
            }
        }

        let idx = (head as usize) & self.mask;
        // SAFETY: Buffer access is safe because:
        // 1. idx is within bounds (masked to capacity)
        // 2. The slot is inside [head, tail), fully written and published
        // 3. assume_init_read moves ownership out; advancing head below marks
        //    the slot uninitialized again before the producer can reuse it
        let value = unsafe {
            let buffer = &*self.buffer.get();
            buffer[idx].assume_init_read()
        };

        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Returns the successor segment, or null if the producer is still here.
    #[inline]
    pub(crate) fn next(&self) -> *mut Segment<T> {
        self.next.load(Ordering::Acquire)
    }

    /// Returns `(head, tail)` for drain checks.
    #[inline]
    pub(crate) fn bounds(&self) -> (u64, u64) {
        (
            self.head.load(Ordering::Relaxed),
            self.tail.load(Ordering::Acquire),
        )
    }
}

impl<T> Drop for Segment<T> {
    fn drop(&mut self) {
        // Drop all initialized items in the segment
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let count = tail.wrapping_sub(head) as usize;
        let mask = self.mask;
        let buffer = self.buffer.get_mut();

        for i in 0..count {
            let idx = (head as usize).wrapping_add(i) & mask;
            // SAFETY: slots in [head, tail) are initialized and owned by the
            // segment; `&mut self` rules out concurrent access.
            unsafe {
                ptr::drop_in_place(buffer[idx].as_mut_ptr());
            }
        }
    }
}
