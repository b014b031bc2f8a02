//! Packet buffers and address metadata carried through the queue.

use crate::invariants::debug_assert_payload_window;
use std::fmt;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Largest UDP payload that fits in an IPv4 datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// One received datagram in a fixed-size owned buffer.
///
/// The valid payload is `buffer[data_start..data_size]`. A fresh packet has
/// `data_start == 0`; only the consumer advances it. There is no `Clone`: a
/// packet is held by exactly one of the producer, the queue or the consumer.
pub struct ReceivedPacket {
    buffer: Box<[u8]>,
    data_size: usize,
    data_start: usize,
}

impl ReceivedPacket {
    /// Allocates an empty packet with a zeroed buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            data_size: 0,
            data_start: 0,
        }
    }

    /// Allocates a packet whose buffer is exactly `payload`.
    pub fn from_payload(payload: &[u8]) -> Self {
        Self {
            buffer: payload.into(),
            data_size: payload.len(),
            data_start: 0,
        }
    }

    /// Size of the underlying buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes of valid payload in the buffer.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Read offset into the payload.
    #[inline]
    pub fn data_start(&self) -> usize {
        self.data_start
    }

    /// The unread part of the payload.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.data_start..self.data_size]
    }

    /// The whole buffer, for a socket read to fill. Follow with
    /// [`set_data_size`](Self::set_data_size).
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Marks the first `size` bytes of the buffer as payload and rewinds the
    /// read offset. `size` is clamped to the buffer capacity.
    pub fn set_data_size(&mut self, size: usize) {
        self.data_size = size.min(self.capacity());
        self.data_start = 0;
        debug_assert_payload_window!(self.data_start, self.data_size, self.capacity());
    }

    /// Consumes up to `n` bytes of payload and returns how many were consumed.
    pub fn advance(&mut self, n: usize) -> usize {
        let n = n.min(self.data_size - self.data_start);
        self.data_start += n;
        debug_assert_payload_window!(self.data_start, self.data_size, self.capacity());
        n
    }

    /// Empties the packet so the buffer can be reused for the next read.
    pub fn reset(&mut self) {
        self.data_size = 0;
        self.data_start = 0;
    }

    /// Payload size as accounted by the queue's byte counter.
    #[inline]
    pub(crate) fn accounted_size(&self) -> i64 {
        self.data_size as i64
    }
}

impl fmt::Debug for ReceivedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedPacket")
            .field("capacity", &self.capacity())
            .field("data_size", &self.data_size)
            .field("data_start", &self.data_start)
            .finish()
    }
}

/// Source and destination endpoints of a received datagram.
///
/// Both are stored as IPv6 socket addresses; IPv4 endpoints are kept in
/// their IPv4-mapped form (`::ffff:a.b.c.d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketMeta {
    /// Address of the peer that sent the datagram.
    pub remote_addr: SocketAddrV6,
    /// Local address the datagram arrived on.
    pub local_addr: SocketAddrV6,
}

impl PacketMeta {
    /// Builds metadata from arbitrary socket addresses, mapping IPv4 into IPv6.
    pub fn new(remote: SocketAddr, local: SocketAddr) -> Self {
        Self {
            remote_addr: to_v6(remote),
            local_addr: to_v6(local),
        }
    }

    /// The peer address, with IPv4-mapped addresses converted back to IPv4.
    pub fn remote(&self) -> SocketAddr {
        from_v6(self.remote_addr)
    }

    /// The local address, with IPv4-mapped addresses converted back to IPv4.
    pub fn local(&self) -> SocketAddr {
        from_v6(self.local_addr)
    }
}

impl Default for PacketMeta {
    fn default() -> Self {
        let unspecified = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0);
        Self {
            remote_addr: unspecified,
            local_addr: unspecified,
        }
    }
}

fn to_v6(addr: SocketAddr) -> SocketAddrV6 {
    match addr {
        SocketAddr::V4(v4) => SocketAddrV6::new(v4.ip().to_ipv6_mapped(), v4.port(), 0, 0),
        SocketAddr::V6(v6) => v6,
    }
}

fn from_v6(addr: SocketAddrV6) -> SocketAddr {
    match addr.ip().to_ipv4_mapped() {
        Some(v4) => SocketAddr::V4(SocketAddrV4::new(v4, addr.port())),
        None => SocketAddr::V6(addr),
    }
}

/// A packet and its metadata, the unit moved through the transport.
#[derive(Debug)]
pub struct QueueEntry {
    /// The datagram.
    pub packet: ReceivedPacket,
    /// Where it came from and where it arrived.
    pub meta: PacketMeta,
}

impl QueueEntry {
    /// Splits the entry into its packet and metadata.
    #[inline]
    pub fn into_parts(self) -> (ReceivedPacket, PacketMeta) {
        (self.packet, self.meta)
    }
}
