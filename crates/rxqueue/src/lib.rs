//! rxqueue - Lock-Free Receive Queue for UDP Datagrams
//!
//! A bounded hand-off queue between the threads that read datagrams off
//! sockets and the single thread that processes them. Producers never block:
//! when the queue is over its packet or byte cap, `push` hands the packet back
//! and the caller drops it, the same way a full kernel receive buffer would.
//!
//! Underneath sits an unbounded lock-free FIFO. Each writer gets a dedicated
//! SPSC lane of linked ring segments, so producers never contend with each
//! other; the consumer scans the lanes round-robin.
//!
//! # Key Features
//!
//! - Approximate (or optionally strict) packet and byte caps
//! - Level-triggered wait signal that cannot lose a wake-up
//! - Byte reservation for control traffic (`is_near_capacity`)
//! - Blocking `recv` helpers with adaptive backoff (spin, yield, park)
//!
//! # Example
//!
//! ```
//! use rxqueue::{single_writer, PacketMeta, QueueConfig, ReceivedPacket};
//! use std::time::Duration;
//!
//! let (factory, mut consumer) = single_writer(QueueConfig::default()).unwrap();
//! let producer = factory.register().unwrap();
//!
//! let packet = ReceivedPacket::from_payload(b"hello");
//! producer.push(packet, PacketMeta::default()).unwrap();
//!
//! let entry = consumer.recv_timeout(Duration::from_secs(1)).unwrap();
//! assert_eq!(entry.packet.payload(), b"hello");
//!
//! // Nothing left: `pop` returns None and clears the wait signal
//! assert!(consumer.pop().is_none());
//! assert!(!consumer.signal().is_raised());
//! ```

mod config;
mod error;
mod invariants;
mod lane;
mod metrics;
mod packet;
mod queue;
mod ring;
mod signal;
mod transport;

pub use config::{AdmissionPolicy, QueueConfig, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use error::{Dropped, QueueError};
pub use metrics::MetricsSnapshot;
pub use packet::{PacketMeta, QueueEntry, ReceivedPacket, MAX_DATAGRAM_SIZE};
pub use queue::{
    multi_writer, packet_queue, single_writer, MultiWriter, PacketConsumer, PacketProducer,
    ProducerFactory, SingleWriter,
};
pub use signal::WaitSignal;
pub use transport::{ManyOneQueue, OneOneQueue, Transport};
