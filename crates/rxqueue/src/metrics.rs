use std::sync::atomic::{AtomicU64, Ordering};

/// Optional metrics for monitoring queue traffic.
///
/// All counters are Relaxed: they are statistics, not synchronization.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    packets_pushed: AtomicU64,
    packets_dropped: AtomicU64,
    packets_popped: AtomicU64,
    bytes_pushed: AtomicU64,
    bytes_popped: AtomicU64,
    signal_rearms: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_push(&self, bytes: u64) {
        self.packets_pushed.fetch_add(1, Ordering::Relaxed);
        self.bytes_pushed.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_drop(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_pop(&self, bytes: u64) {
        self.packets_popped.fetch_add(1, Ordering::Relaxed);
        self.bytes_popped.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rearm(&self) {
        self.signal_rearms.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_pushed: self.packets_pushed.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            packets_popped: self.packets_popped.load(Ordering::Relaxed),
            bytes_pushed: self.bytes_pushed.load(Ordering::Relaxed),
            bytes_popped: self.bytes_popped.load(Ordering::Relaxed),
            signal_rearms: self.signal_rearms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the queue metrics.
///
/// All zero unless `QueueConfig::enable_metrics` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Packets accepted by `push`.
    pub packets_pushed: u64,
    /// Packets rejected by `push` for lack of capacity.
    pub packets_dropped: u64,
    /// Packets handed out by `pop`.
    pub packets_popped: u64,
    /// Payload bytes accepted by `push`.
    pub bytes_pushed: u64,
    /// Payload bytes handed out by `pop`.
    pub bytes_popped: u64,
    /// Times `pop` found data on the re-check after clearing the signal and
    /// raised it again.
    pub signal_rearms: u64,
}

impl MetricsSnapshot {
    /// Fraction of push attempts that were dropped, in `[0, 1]`.
    pub fn drop_ratio(&self) -> f64 {
        let attempts = self.packets_pushed + self.packets_dropped;
        if attempts == 0 {
            0.0
        } else {
            self.packets_dropped as f64 / attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let m = Metrics::new();
        m.record_push(100);
        m.record_push(50);
        m.record_drop();
        m.record_pop(100);
        m.record_rearm();

        let s = m.snapshot();
        assert_eq!(s.packets_pushed, 2);
        assert_eq!(s.bytes_pushed, 150);
        assert_eq!(s.packets_dropped, 1);
        assert_eq!(s.packets_popped, 1);
        assert_eq!(s.bytes_popped, 100);
        assert_eq!(s.signal_rearms, 1);
        assert!((s.drop_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_drop_ratio_empty() {
        assert_eq!(MetricsSnapshot::default().drop_ratio(), 0.0);
    }
}
