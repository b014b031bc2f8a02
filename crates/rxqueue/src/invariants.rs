//! Debug assertion macros for queue invariants.
//!
//! They are only active in debug builds (`#[cfg(debug_assertions)]`), so there is
//! zero overhead in release builds. A failing check is a bug in the caller or in
//! this crate, never a runtime condition to recover from.

// =============================================================================
// Occupancy counters
// =============================================================================

/// Assert that the occupancy counters are non-negative after a pop.
///
/// **Invariant**: every decrement is preceded (happens-before, through the
/// transport's Release/Acquire hand-off) by the matching increment in `push`.
///
/// Used in: `PacketConsumer::pop()` after decrementing both counters
macro_rules! debug_assert_non_negative_occupancy {
    ($packets:expr, $bytes:expr) => {
        debug_assert!(
            $packets >= 0 && $bytes >= 0,
            "occupancy underflow: packet_count {} byte_size {}",
            $packets,
            $bytes
        )
    };
}

/// Assert that strict admission kept the counters within their caps.
///
/// **Invariant**: `packet_count ≤ max_packets` under `AdmissionPolicy::Strict`
///
/// Used in: `Shared::admit_strict()` after a successful reservation
macro_rules! debug_assert_within_cap {
    ($count:expr, $cap:expr) => {
        debug_assert!(
            $count <= $cap,
            "strict admission overshoot: count {} exceeds cap {}",
            $count,
            $cap
        )
    };
}

// =============================================================================
// Packet buffers
// =============================================================================

/// Assert that a packet has not been partially read before it is queued.
///
/// **Invariant**: `data_start == 0` at submission
///
/// Used in: `PacketProducer::push()`
macro_rules! debug_assert_unread_packet {
    ($data_start:expr) => {
        debug_assert!(
            $data_start == 0,
            "partially consumed packet submitted: data_start {}",
            $data_start
        )
    };
}

/// Assert that a payload window stays inside the buffer.
///
/// **Invariant**: `data_start ≤ data_size ≤ capacity`
///
/// Used in: `ReceivedPacket::set_data_size()` and `ReceivedPacket::advance()`
macro_rules! debug_assert_payload_window {
    ($start:expr, $size:expr, $capacity:expr) => {
        debug_assert!(
            $start <= $size && $size <= $capacity,
            "payload window [{}, {}) outside buffer of {} bytes",
            $start,
            $size,
            $capacity
        )
    };
}

// =============================================================================
// Transport segments
// =============================================================================

/// Assert that a segment never holds more items than it has slots.
///
/// **Invariant**: `0 ≤ (tail - head) ≤ capacity`
///
/// Used in: `Segment::try_push()` before publishing the new tail
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "segment count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that the consumer only retires a segment it has fully drained.
///
/// **Invariant**: a segment is freed only when `head == tail` and a successor is linked
///
/// Used in: `Lane::pop()` before freeing the head segment
macro_rules! debug_assert_drained_segment {
    ($head:expr, $tail:expr) => {
        debug_assert!(
            $head == $tail,
            "retiring segment with {} unread items",
            $tail.wrapping_sub($head)
        )
    };
}

/// Assert that a lane index is within the transport.
///
/// Used in: `OneOneQueue::enqueue()` and `ManyOneQueue::enqueue()`
macro_rules! debug_assert_lane {
    ($lane:expr, $lanes:expr) => {
        debug_assert!(
            $lane < $lanes,
            "lane {} out of range (transport has {} lanes)",
            $lane,
            $lanes
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_drained_segment;
pub(crate) use debug_assert_lane;
pub(crate) use debug_assert_non_negative_occupancy;
pub(crate) use debug_assert_payload_window;
pub(crate) use debug_assert_unread_packet;
pub(crate) use debug_assert_within_cap;
