//! # UDP Receive Queue Demo
//!
//! Socket reader threads feed datagrams into one `rxqueue` and a single
//! consumer drains it, the way a networking stack hands received packets to
//! its protocol thread.
//!
//! - One reader thread per UDP socket, each with its own producer lane
//! - A sender thread blasting datagrams of random size at all sockets
//! - A deliberately slow consumer with a small byte cap, so drops show up
//! - Final statistics from the queue metrics
//!
//! ## Running
//!
//! ```bash
//! # Quick mode (2 sockets, 1 second)
//! cargo run -p rxqueue --bin rxqueue-demo --features demo --release -- --quick
//!
//! # Full mode (4 sockets, 3 seconds), with queue lifecycle logs
//! RUST_LOG=rxqueue=debug cargo run -p rxqueue --bin rxqueue-demo --features demo --release
//! ```

use rand::Rng;
use rxqueue::{
    multi_writer, MultiWriter, PacketMeta, PacketProducer, QueueConfig, ReceivedPacket,
    MAX_DATAGRAM_SIZE,
};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct DemoConfig {
    sockets: usize,
    duration: Duration,
}

impl DemoConfig {
    fn from_args() -> Self {
        if std::env::args().any(|arg| arg == "--quick") {
            Self {
                sockets: 2,
                duration: Duration::from_secs(1),
            }
        } else {
            Self {
                sockets: 4,
                duration: Duration::from_secs(3),
            }
        }
    }
}

/// Reads datagrams off `socket` until `stop` is set. Returns the number of
/// packets the queue rejected.
fn read_socket(
    socket: UdpSocket,
    producer: PacketProducer<MultiWriter>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<u64> {
    let local = socket.local_addr()?;
    socket.set_read_timeout(Some(Duration::from_millis(50)))?;

    let mut dropped = 0u64;
    let mut packet = ReceivedPacket::with_capacity(MAX_DATAGRAM_SIZE);
    while !stop.load(Ordering::Relaxed) {
        let (len, remote) = match socket.recv_from(packet.buffer_mut()) {
            Ok(received) => received,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue;
            }
            Err(err) => return Err(err),
        };

        packet.set_data_size(len);
        packet = match producer.push(packet, PacketMeta::new(remote, local)) {
            Ok(()) => ReceivedPacket::with_capacity(MAX_DATAGRAM_SIZE),
            Err(rejected) => {
                dropped += 1;
                // Reuse the buffer for the next read
                let mut packet = rejected.into_packet();
                packet.reset();
                packet
            }
        };
    }
    Ok(dropped)
}

fn send_traffic(targets: Vec<SocketAddr>, stop: Arc<AtomicBool>) -> std::io::Result<u64> {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
    let mut rng = rand::thread_rng();
    let payload = vec![0xa5u8; 1_472];

    let mut sent = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let target = targets[rng.gen_range(0..targets.len())];
        let size = rng.gen_range(16..payload.len());
        socket.send_to(&payload[..size], target)?;
        sent += 1;
        if sent % 256 == 0 {
            thread::yield_now();
        }
    }
    Ok(sent)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rxqueue=info,rxqueue_demo=info".into()),
        )
        .init();

    let demo = DemoConfig::from_args();
    let config = QueueConfig::new(demo.sockets)
        .with_max_bytes(256 << 10)
        .with_reserved_bytes(32 << 10)
        .with_metrics(true);
    let (factory, mut consumer) = multi_writer(config)?;
    let stop = Arc::new(AtomicBool::new(false));

    let mut targets = Vec::with_capacity(demo.sockets);
    let mut readers = Vec::with_capacity(demo.sockets);
    for _ in 0..demo.sockets {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        targets.push(socket.local_addr()?);
        let producer = factory.register()?;
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || read_socket(socket, producer, stop)));
    }
    info!(sockets = demo.sockets, ?targets, "readers started");

    let sender = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || send_traffic(targets, stop))
    };

    let started = Instant::now();
    let mut processed = 0u64;
    let mut payload_bytes = 0u64;
    let mut near_capacity_seen = 0u64;
    while started.elapsed() < demo.duration {
        let Some(entry) = consumer.recv_timeout(Duration::from_millis(100)) else {
            continue;
        };
        payload_bytes += entry.packet.data_size() as u64;
        processed += 1;

        if consumer.is_near_capacity() {
            near_capacity_seen += 1;
        }
        // Simulated protocol work
        if processed % 64 == 0 {
            thread::sleep(Duration::from_micros(200));
        }
    }

    stop.store(true, Ordering::Relaxed);
    let sent = match sender.join() {
        Ok(result) => result?,
        Err(_) => return Err("sender thread panicked".into()),
    };
    let mut reader_drops = 0u64;
    for reader in readers {
        match reader.join() {
            Ok(Ok(dropped)) => reader_drops += dropped,
            Ok(Err(err)) => warn!(%err, "socket reader failed"),
            Err(_) => warn!("socket reader panicked"),
        }
    }

    let leftover = consumer.drain(usize::MAX, drop);
    let metrics = consumer.metrics();
    let elapsed = started.elapsed().as_secs_f64();

    println!();
    println!("=== rxqueue demo ===");
    println!("sockets               {}", demo.sockets);
    println!("datagrams sent        {}", sent);
    println!("processed             {} ({:.0}/s)", processed, processed as f64 / elapsed);
    println!("payload processed     {} bytes", payload_bytes);
    println!("left in queue         {}", leftover);
    println!(
        "dropped by queue      {} ({:.2}%)",
        metrics.packets_dropped,
        metrics.drop_ratio() * 100.0
    );
    println!("dropped (readers)     {}", reader_drops);
    println!("signal re-arms        {}", metrics.signal_rearms);
    println!("near-capacity pops    {}", near_capacity_seen);

    Ok(())
}
