use crate::QueueError;

/// How `push` decides whether a packet fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Load both counters, compare, then add.
    ///
    /// Producers racing through the check can each pass it before any of them
    /// has added, so the queue may hold up to `writers` packets (and their
    /// bytes) more than the caps allow. This is how an OS receive buffer
    /// behaves as well and costs two relaxed loads on the fast path.
    #[default]
    Approximate,
    /// Reserve capacity with compare-and-swap loops; the caps are never
    /// exceeded. A rejected byte reservation rolls back the packet slot, which
    /// may briefly make a concurrent push see the queue as full.
    Strict,
}

/// Configuration for a packet queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Upper bound on resident packets.
    pub max_packets: i64,
    /// Upper bound on resident payload bytes.
    pub max_bytes: i64,
    /// Slice of `max_bytes` kept free for control traffic, see
    /// `is_near_capacity`.
    pub reserved_bytes: i64,
    /// Number of producer lanes (`W`).
    pub writers: usize,
    /// Transport segment size as power of 2 (default: 10 = 1024 slots)
    pub segment_bits: u8,
    /// Capacity check used by `push`.
    pub admission: AdmissionPolicy,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl QueueConfig {
    /// Packet cap of the receive path this queue stands in for; effectively unbounded.
    pub const DEFAULT_MAX_PACKETS: i64 = i32::MAX as i64;
    /// 32 MiB of resident payload.
    pub const DEFAULT_MAX_BYTES: i64 = 32 << 20;
    /// 1 MiB carved out for the command channel.
    pub const DEFAULT_RESERVED_BYTES: i64 = 1 << 20;

    const MAX_SEGMENT_BITS: u8 = 20;

    /// Creates a configuration with the default caps for `writers` producers.
    pub const fn new(writers: usize) -> Self {
        Self {
            max_packets: Self::DEFAULT_MAX_PACKETS,
            max_bytes: Self::DEFAULT_MAX_BYTES,
            reserved_bytes: Self::DEFAULT_RESERVED_BYTES,
            writers,
            segment_bits: 10,
            admission: AdmissionPolicy::Approximate,
            enable_metrics: false,
        }
    }

    /// Sets the packet cap.
    pub const fn with_max_packets(mut self, max_packets: i64) -> Self {
        self.max_packets = max_packets;
        self
    }

    /// Sets the byte cap.
    pub const fn with_max_bytes(mut self, max_bytes: i64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Sets the control-traffic reservation.
    pub const fn with_reserved_bytes(mut self, reserved_bytes: i64) -> Self {
        self.reserved_bytes = reserved_bytes;
        self
    }

    /// Sets the number of producer lanes.
    pub const fn with_writers(mut self, writers: usize) -> Self {
        self.writers = writers;
        self
    }

    /// Sets the transport segment size (as power of 2).
    pub const fn with_segment_bits(mut self, segment_bits: u8) -> Self {
        self.segment_bits = segment_bits;
        self
    }

    /// Sets the admission policy.
    pub const fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    /// Enables or disables metrics.
    pub const fn with_metrics(mut self, enable_metrics: bool) -> Self {
        self.enable_metrics = enable_metrics;
        self
    }

    /// Returns the number of slots in one transport segment.
    #[inline]
    pub const fn segment_capacity(&self) -> usize {
        1 << self.segment_bits
    }

    /// Byte level at which `is_near_capacity` starts reporting `true`.
    #[inline]
    pub const fn data_byte_limit(&self) -> i64 {
        self.max_bytes - self.reserved_bytes
    }

    /// Checks the configuration against a transport that supports at most
    /// `max_writers` producer lanes.
    pub fn validate(&self, max_writers: usize) -> Result<(), QueueError> {
        if self.writers == 0 {
            return Err(QueueError::InvalidConfig("writers must be at least 1"));
        }
        if self.writers > max_writers {
            return Err(QueueError::InvalidConfig(
                "writers exceeds what the transport supports",
            ));
        }
        if self.max_packets <= 0 {
            return Err(QueueError::InvalidConfig("max_packets must be positive"));
        }
        if self.max_bytes <= 0 {
            return Err(QueueError::InvalidConfig("max_bytes must be positive"));
        }
        if self.reserved_bytes < 0 || self.reserved_bytes > self.max_bytes {
            return Err(QueueError::InvalidConfig(
                "reserved_bytes must be within 0..=max_bytes",
            ));
        }
        if self.segment_bits == 0 || self.segment_bits > Self::MAX_SEGMENT_BITS {
            return Err(QueueError::InvalidConfig(
                "segment_bits must be within 1..=20",
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Low latency configuration (single reader thread, 256-slot segments, 4 MiB of payload)
pub const LOW_LATENCY_CONFIG: QueueConfig = QueueConfig::new(1)
    .with_segment_bits(8)
    .with_max_bytes(4 << 20)
    .with_reserved_bytes(256 << 10);

/// High throughput configuration (8 reader threads, 4K-slot segments, 128 MiB of payload)
pub const HIGH_THROUGHPUT_CONFIG: QueueConfig = QueueConfig::new(8)
    .with_segment_bits(12)
    .with_max_bytes(128 << 20)
    .with_reserved_bytes(4 << 20);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_caps() {
        let config = QueueConfig::default();
        assert_eq!(config.max_packets, i64::from(i32::MAX));
        assert_eq!(config.max_bytes, 32 * 1024 * 1024);
        assert_eq!(config.data_byte_limit(), 31 * 1024 * 1024);
        assert_eq!(config.writers, 1);
        assert_eq!(config.segment_capacity(), 1024);
        assert_eq!(config.admission, AdmissionPolicy::Approximate);
        assert!(config.validate(1).is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(LOW_LATENCY_CONFIG.validate(1).is_ok());
        assert!(HIGH_THROUGHPUT_CONFIG.validate(usize::MAX).is_ok());
        assert!(HIGH_THROUGHPUT_CONFIG.validate(1).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = QueueConfig::default();
        assert!(base.with_writers(0).validate(4).is_err());
        assert!(base.with_max_packets(0).validate(1).is_err());
        assert!(base.with_max_bytes(-1).validate(1).is_err());
        assert!(base.with_reserved_bytes(-1).validate(1).is_err());
        assert!(base
            .with_max_bytes(10)
            .with_reserved_bytes(11)
            .validate(1)
            .is_err());
        assert!(base.with_segment_bits(0).validate(1).is_err());
        assert!(base.with_segment_bits(21).validate(1).is_err());
        assert!(matches!(
            base.with_writers(2).validate(1),
            Err(QueueError::InvalidConfig(_))
        ));
    }
}
