//! Miri-compatible tests for detecting undefined behavior.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! These exercise the unsafe paths behind the public API with small sizes so
//! Miri finishes quickly:
//! - slot writes and moves in ring segments
//! - segment allocation, linking and retirement in lanes
//! - freeing resident packets at teardown

use rxqueue::{multi_writer, single_writer, PacketMeta, QueueConfig, ReceivedPacket};
use std::thread;

fn small(writers: usize) -> QueueConfig {
    // 2-slot segments so every few pushes cross a segment boundary
    QueueConfig::new(writers).with_segment_bits(1)
}

/// Push and pop across several segment boundaries.
#[test]
fn miri_segment_growth_and_retirement() {
    let (factory, mut consumer) = single_writer(small(1)).unwrap();
    let producer = factory.register().unwrap();

    for round in 0..3u8 {
        for i in 0..5u8 {
            producer
                .push(ReceivedPacket::from_payload(&[round, i]), PacketMeta::default())
                .unwrap();
        }
        for i in 0..5u8 {
            let entry = consumer.pop().unwrap();
            assert_eq!(entry.packet.payload(), &[round, i]);
        }
        assert!(consumer.pop().is_none());
    }
}

/// Drop the queue while packets sit in several segments and lanes.
#[test]
fn miri_teardown_with_resident_packets() {
    let (factory, mut consumer) = multi_writer(small(3)).unwrap();
    let producers: Vec<_> = (0..3).map(|_| factory.register().unwrap()).collect();

    for (lane, producer) in producers.iter().enumerate() {
        for i in 0..(lane + 3) {
            producer
                .push(ReceivedPacket::from_payload(&[i as u8; 32]), PacketMeta::default())
                .unwrap();
        }
    }

    // Leave some behind in a partially drained segment
    assert_eq!(consumer.drain(4, drop), 4);

    drop(producers);
    drop(factory);
    drop(consumer);
}

/// Rejected packets come back intact and are freed by the caller.
#[test]
fn miri_dropped_packet_ownership() {
    let (factory, _consumer) = single_writer(small(1).with_max_packets(1)).unwrap();
    let producer = factory.register().unwrap();

    producer
        .push(ReceivedPacket::from_payload(b"kept"), PacketMeta::default())
        .unwrap();
    let rejected = producer
        .push(ReceivedPacket::from_payload(b"rejected"), PacketMeta::default())
        .unwrap_err();

    let mut packet = rejected.into_packet();
    assert_eq!(packet.payload(), b"rejected");
    assert_eq!(packet.advance(3), 3);
    assert_eq!(packet.payload(), b"ected");
}

/// One producer thread, one consumer thread, across segment boundaries.
#[test]
fn miri_cross_thread_handoff() {
    const N: u8 = 20;
    let (factory, mut consumer) = single_writer(small(1)).unwrap();
    let producer = factory.register().unwrap();

    let handle = thread::spawn(move || {
        for i in 0..N {
            producer
                .push(ReceivedPacket::from_payload(&[i]), PacketMeta::default())
                .unwrap();
        }
    });

    for i in 0..N {
        let entry = consumer.recv();
        assert_eq!(entry.packet.payload(), &[i]);
    }
    handle.join().unwrap();
}
