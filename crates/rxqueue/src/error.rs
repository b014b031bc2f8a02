//! Error types for queue operations.

use crate::ReceivedPacket;
use thiserror::Error;

/// Errors from queue construction and producer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Every producer lane is already taken.
    #[error("too many producers registered (max: {max})")]
    TooManyProducers {
        /// The configured number of writer lanes.
        max: usize,
    },
    /// The configuration was rejected.
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(&'static str),
}

/// A packet rejected by `push` because the queue was at capacity.
///
/// The packet is handed back untouched; the caller decides whether to free
/// it or reuse its buffer for the next read.
#[derive(Debug, Error)]
#[error("packet dropped: receive queue at capacity ({} payload bytes)", .packet.data_size())]
pub struct Dropped {
    packet: ReceivedPacket,
}

impl Dropped {
    pub(crate) fn new(packet: ReceivedPacket) -> Self {
        Self { packet }
    }

    /// Returns the rejected packet.
    pub fn packet(&self) -> &ReceivedPacket {
        &self.packet
    }

    /// Takes back ownership of the rejected packet.
    pub fn into_packet(self) -> ReceivedPacket {
        self.packet
    }
}
