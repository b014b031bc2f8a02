use crate::invariants::{
    debug_assert_non_negative_occupancy, debug_assert_unread_packet, debug_assert_within_cap,
};
use crate::metrics::Metrics;
use crate::{
    AdmissionPolicy, Dropped, ManyOneQueue, MetricsSnapshot, OneOneQueue, PacketMeta, QueueConfig,
    QueueEntry, QueueError, ReceivedPacket, Transport, WaitSignal,
};
use crossbeam_utils::{Backoff, CachePadded};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Transport for a queue fed by one socket reader.
pub type SingleWriter = OneOneQueue<QueueEntry>;

/// Transport for a queue fed by several socket readers.
pub type MultiWriter = ManyOneQueue<QueueEntry>;

/// Creates a packet queue over transport `Q`.
///
/// Returns a [`ProducerFactory`] that hands out up to `config.writers`
/// producers, and the queue's only [`PacketConsumer`]. The queue lives until
/// the factory, every producer and the consumer have been dropped; packets
/// still queued at that point are freed.
pub fn packet_queue<Q: Transport<QueueEntry>>(
    config: QueueConfig,
) -> Result<(ProducerFactory<Q>, PacketConsumer<Q>), QueueError> {
    if let Err(err) = config.validate(Q::MAX_WRITERS) {
        warn!(%err, ?config, "rejected packet queue configuration");
        return Err(err);
    }

    let shared = Arc::new(Shared::<Q>::new(config));
    debug!(
        writers = config.writers,
        max_packets = config.max_packets,
        max_bytes = config.max_bytes,
        admission = ?config.admission,
        "packet queue created"
    );

    let factory = ProducerFactory {
        shared: Arc::clone(&shared),
    };
    Ok((factory, PacketConsumer { shared }))
}

/// Creates a packet queue for exactly one producer.
pub fn single_writer(
    config: QueueConfig,
) -> Result<(ProducerFactory<SingleWriter>, PacketConsumer<SingleWriter>), QueueError> {
    packet_queue(config)
}

/// Creates a packet queue for `config.writers` producers.
pub fn multi_writer(
    config: QueueConfig,
) -> Result<(ProducerFactory<MultiWriter>, PacketConsumer<MultiWriter>), QueueError> {
    packet_queue(config)
}

// =============================================================================
// Shared state
// =============================================================================

struct Shared<Q: Transport<QueueEntry>> {
    /// Resident entries; only touched with atomic add/sub (or CAS in strict mode)
    packet_count: CachePadded<AtomicI64>,
    /// Sum of `data_size` over resident entries
    byte_size: CachePadded<AtomicI64>,
    transport: Q,
    signal: WaitSignal,
    /// Lane ownership flags, one per writer
    lanes: Box<[AtomicBool]>,
    config: QueueConfig,
    metrics: Metrics,
}

impl<Q: Transport<QueueEntry>> Shared<Q> {
    fn new(config: QueueConfig) -> Self {
        let transport = Q::with_writers(config.writers, config.segment_bits);
        let lanes = (0..transport.writers())
            .map(|_| AtomicBool::new(false))
            .collect();
        Self {
            packet_count: CachePadded::new(AtomicI64::new(0)),
            byte_size: CachePadded::new(AtomicI64::new(0)),
            transport,
            signal: WaitSignal::new(),
            lanes,
            config,
            metrics: Metrics::new(),
        }
    }

    // ---------------------------------------------------------------------
    // ADMISSION
    // ---------------------------------------------------------------------

    /// Reserves room for one packet of `size` bytes, or reports the queue full.
    #[inline]
    fn admit(&self, size: i64) -> bool {
        match self.config.admission {
            AdmissionPolicy::Approximate => self.admit_approximate(size),
            AdmissionPolicy::Strict => self.admit_strict(size),
        }
    }

    /// Check, then add. Not atomic as a whole: producers that pass the check
    /// at the same time all get in, so occupancy may exceed the caps by up to
    /// `writers` packets. A kernel receive buffer is just as approximate, and
    /// the fast path stays at two loads and two adds.
    #[inline]
    fn admit_approximate(&self, size: i64) -> bool {
        if self.packet_count.load(Ordering::Relaxed) >= self.config.max_packets
            || self.byte_size.load(Ordering::Relaxed) >= self.config.max_bytes
        {
            return false;
        }
        self.packet_count.fetch_add(1, Ordering::Relaxed);
        self.byte_size.fetch_add(size, Ordering::Relaxed);
        true
    }

    /// Exact variant: each counter is reserved with a CAS loop, and a failed
    /// byte reservation gives the packet slot back.
    fn admit_strict(&self, size: i64) -> bool {
        let max_packets = self.config.max_packets;
        let max_bytes = self.config.max_bytes;

        let reserved = self
            .packet_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n < max_packets).then_some(n + 1)
            });
        let Ok(previous) = reserved else {
            return false;
        };
        debug_assert_within_cap!(previous + 1, max_packets);

        let bytes = self
            .byte_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| {
                (b < max_bytes).then_some(b + size)
            });
        if bytes.is_err() {
            self.packet_count.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    #[inline]
    fn len(&self) -> i64 {
        self.packet_count.load(Ordering::Relaxed)
    }

    #[inline]
    fn byte_size(&self) -> i64 {
        self.byte_size.load(Ordering::Relaxed)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn is_near_capacity(&self) -> bool {
        self.len() >= self.config.max_packets || self.byte_size() >= self.config.data_byte_limit()
    }

    fn metrics(&self) -> MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    // ---------------------------------------------------------------------
    // LANES
    // ---------------------------------------------------------------------

    /// Claims a free lane. The Acquire pairs with the Release in
    /// `release_lane`, ordering a new owner after the previous one.
    fn claim_lane(&self) -> Option<usize> {
        self.lanes.iter().position(|taken| {
            taken
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        })
    }

    fn release_lane(&self, lane: usize) {
        self.lanes[lane].store(false, Ordering::Release);
    }

    fn registered(&self) -> usize {
        self.lanes
            .iter()
            .filter(|taken| taken.load(Ordering::Relaxed))
            .count()
    }
}

impl<Q: Transport<QueueEntry>> Drop for Shared<Q> {
    fn drop(&mut self) {
        let mut drained = 0usize;
        // SAFETY: `&mut self` means every handle is gone; nothing else can be
        // enqueuing or dequeuing.
        while let Some(entry) = unsafe { self.transport.dequeue() } {
            drop(entry);
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, "freed packets still queued at teardown");
        }
    }
}

// =============================================================================
// Producer side
// =============================================================================

/// Hands out producers, at most one per writer lane at a time.
///
/// `ProducerFactory` is `Clone`, so every socket reader thread can hold one
/// and register its own producer.
pub struct ProducerFactory<Q: Transport<QueueEntry>> {
    shared: Arc<Shared<Q>>,
}

impl<Q: Transport<QueueEntry>> Clone for ProducerFactory<Q> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Q: Transport<QueueEntry>> ProducerFactory<Q> {
    /// Registers a producer on a free lane.
    ///
    /// Fails with [`QueueError::TooManyProducers`] while all `writers` lanes
    /// are held. Dropping a producer frees its lane for the next `register`.
    pub fn register(&self) -> Result<PacketProducer<Q>, QueueError> {
        let Some(lane) = self.shared.claim_lane() else {
            return Err(QueueError::TooManyProducers {
                max: self.shared.transport.writers(),
            });
        };
        debug!(lane, "producer registered");
        Ok(PacketProducer {
            shared: Arc::clone(&self.shared),
            lane,
            _not_sync: PhantomData,
        })
    }

    /// Number of writer lanes (`W`).
    pub fn writers(&self) -> usize {
        self.shared.transport.writers()
    }

    /// Number of lanes currently held by a producer.
    pub fn registered(&self) -> usize {
        self.shared.registered()
    }

    /// Relaxed snapshot of `packet_count == 0`; may be stale.
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// True when the packet cap is reached or the data share of the byte
    /// budget (`max_bytes - reserved_bytes`) is used up.
    pub fn is_near_capacity(&self) -> bool {
        self.shared.is_near_capacity()
    }

    /// Resident packets (approximate under concurrency).
    pub fn len(&self) -> i64 {
        self.shared.len()
    }

    /// Resident payload bytes (approximate under concurrency).
    pub fn byte_size(&self) -> i64 {
        self.shared.byte_size()
    }

    /// The queue's wait signal.
    pub fn signal(&self) -> &WaitSignal {
        &self.shared.signal
    }

    /// Metrics snapshot (zeroed unless enabled in the config).
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics()
    }

    /// The configuration the queue was built with.
    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }
}

/// Producer handle bound to one writer lane.
///
/// Not `Clone` and not `Sync`: a lane has exactly one writer. Move it into
/// the socket reader thread that owns it.
pub struct PacketProducer<Q: Transport<QueueEntry>> {
    shared: Arc<Shared<Q>>,
    lane: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl<Q: Transport<QueueEntry>> std::fmt::Debug for PacketProducer<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketProducer")
            .field("lane", &self.lane)
            .finish_non_exhaustive()
    }
}

impl<Q: Transport<QueueEntry>> PacketProducer<Q> {
    /// Queues a received packet, or hands it back if the queue is full.
    ///
    /// `packet.data_start()` must be 0. On success the counters are bumped,
    /// the entry is enqueued and the wait signal is raised, in that order.
    /// On `Err` nothing was changed and the caller owns the packet again.
    ///
    /// Never blocks. With the default [`AdmissionPolicy::Approximate`], up to
    /// `writers` concurrent pushes can slip past a full queue; see
    /// [`AdmissionPolicy`].
    pub fn push(&self, packet: ReceivedPacket, meta: PacketMeta) -> Result<(), Dropped> {
        debug_assert_unread_packet!(packet.data_start());
        let shared = &*self.shared;
        let size = packet.accounted_size();

        if !shared.admit(size) {
            if shared.config.enable_metrics {
                shared.metrics.record_drop();
            }
            return Err(Dropped::new(packet));
        }

        // SAFETY: this producer holds `self.lane` exclusively (claimed with
        // Acquire in `register`, released with Release on drop) and is !Sync.
        unsafe { shared.transport.enqueue(self.lane, QueueEntry { packet, meta }) };
        shared.signal.raise();

        if shared.config.enable_metrics {
            shared.metrics.record_push(size as u64);
        }
        Ok(())
    }

    /// The lane this producer writes to.
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// Relaxed snapshot of `packet_count == 0`; may be stale.
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// See [`ProducerFactory::is_near_capacity`].
    pub fn is_near_capacity(&self) -> bool {
        self.shared.is_near_capacity()
    }
}

impl<Q: Transport<QueueEntry>> Drop for PacketProducer<Q> {
    fn drop(&mut self) {
        self.shared.release_lane(self.lane);
        trace!(lane = self.lane, "producer released lane");
    }
}

// =============================================================================
// Consumer side
// =============================================================================

/// The queue's single consumer.
///
/// There is exactly one per queue and every dequeue takes `&mut self`, so
/// two threads can never pop concurrently.
pub struct PacketConsumer<Q: Transport<QueueEntry>> {
    shared: Arc<Shared<Q>>,
}

impl<Q: Transport<QueueEntry>> PacketConsumer<Q> {
    /// Takes the next packet, or returns `None` if the queue is empty.
    ///
    /// Never blocks. When the transport looks empty the wait signal is
    /// cleared *before* a second look, and raised again if that second look
    /// finds an entry. A producer racing the clear therefore either has its
    /// entry found here or leaves the signal raised, so a consumer that
    /// waits on the signal after `None` cannot sleep through pending data.
    pub fn pop(&mut self) -> Option<QueueEntry> {
        let shared = &*self.shared;

        // SAFETY: `PacketConsumer` is unique per queue and `pop` takes
        // `&mut self`, so this is the only thread dequeuing.
        let entry = match unsafe { shared.transport.dequeue() } {
            Some(entry) => entry,
            None => {
                shared.signal.clear();
                // SAFETY: as above.
                let entry = unsafe { shared.transport.dequeue() }?;
                // A producer enqueued between the two looks and its raise may
                // have been wiped by the clear.
                shared.signal.raise();
                if shared.config.enable_metrics {
                    shared.metrics.record_rearm();
                }
                entry
            }
        };

        let size = entry.packet.accounted_size();
        let packets = shared.packet_count.fetch_sub(1, Ordering::Relaxed) - 1;
        let bytes = shared.byte_size.fetch_sub(size, Ordering::Relaxed) - size;
        debug_assert_non_negative_occupancy!(packets, bytes);

        if shared.config.enable_metrics {
            shared.metrics.record_pop(size as u64);
        }
        Some(entry)
    }

    /// Blocks until a packet is available and returns it.
    ///
    /// Spins briefly with an adaptive backoff, then parks on the wait signal.
    pub fn recv(&mut self) -> QueueEntry {
        let backoff = Backoff::new();
        loop {
            if let Some(entry) = self.pop() {
                return entry;
            }
            if backoff.is_completed() {
                self.shared.signal.wait();
            } else {
                backoff.snooze();
            }
        }
    }

    /// Like [`recv`](Self::recv), giving up after `timeout`.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<QueueEntry> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.recv_deadline(deadline),
            None => Some(self.recv()),
        }
    }

    /// Like [`recv`](Self::recv), giving up once `deadline` has passed.
    pub fn recv_deadline(&mut self, deadline: Instant) -> Option<QueueEntry> {
        let backoff = Backoff::new();
        loop {
            if let Some(entry) = self.pop() {
                return Some(entry);
            }
            if !backoff.is_completed() {
                backoff.snooze();
            } else if !self.shared.signal.wait_deadline(deadline) {
                return self.pop();
            }
        }
    }

    /// Pops up to `max` packets into `handler` and returns how many were taken.
    pub fn drain<F>(&mut self, max: usize, mut handler: F) -> usize
    where
        F: FnMut(QueueEntry),
    {
        let mut count = 0;
        while count < max {
            let Some(entry) = self.pop() else {
                break;
            };
            handler(entry);
            count += 1;
        }
        count
    }

    /// Relaxed snapshot of `packet_count == 0`; may be stale.
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// See [`ProducerFactory::is_near_capacity`].
    pub fn is_near_capacity(&self) -> bool {
        self.shared.is_near_capacity()
    }

    /// Resident packets (approximate under concurrency).
    pub fn len(&self) -> i64 {
        self.shared.len()
    }

    /// Resident payload bytes (approximate under concurrency).
    pub fn byte_size(&self) -> i64 {
        self.shared.byte_size()
    }

    /// The wait signal to block on after `pop` returned `None`.
    pub fn signal(&self) -> &WaitSignal {
        &self.shared.signal
    }

    /// Metrics snapshot (zeroed unless enabled in the config).
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics()
    }
}
