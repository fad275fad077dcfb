// CAN-to-UART bridge: two periodic workers decoupled by the ring buffer.
//
// The source worker originates one telemetry frame per tick on the bus and
// pushes the derived sample; the sink worker drains samples and emits them
// as lines on the host link. Both run against their own anchored schedule,
// never block on the buffer (drop-and-count / skip-tick), and hold the
// shared lock only for the buffer operation itself - all IO happens outside
// the lock.

pub mod host;
pub mod ring;
pub mod scheduler;

pub use host::{HostError, HostLink};
pub use ring::RingBuffer;
pub use scheduler::PeriodicScheduler;

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::bus::{encode_sample, BusTx, Channel};

/// Bridge timing and shutdown parameters.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Source (bus) worker period.
    pub bus_period: Duration,
    /// Sink (serial) worker period.
    pub host_period: Duration,
    /// Fixed tick count after which both workers exit.
    pub total_samples: u32,
    /// Head start given to the source worker so the buffer begins filling
    /// before draining starts.
    pub sink_start_delay: Duration,
}

/// Counters owned by the source worker.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SourceStats {
    /// Samples accepted into the buffer.
    pub produced: u64,
    /// Samples rejected because the buffer was full.
    pub dropped: u64,
    /// Bus transmit failures (the worker exits on the first one).
    pub bus_errors: u64,
}

/// Counters owned by the sink worker.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SinkStats {
    /// Samples read from the buffer and emitted on the host link.
    pub emitted: u64,
    /// Ticks that found the buffer empty.
    pub empty_ticks: u64,
    /// Host link write failures (the worker exits on the first one).
    pub link_errors: u64,
}

fn lock_buffer<T>(buffer: &Mutex<RingBuffer<T>>) -> MutexGuard<'_, RingBuffer<T>> {
    match buffer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Bus-side worker: one frame out, one sample in, per tick.
fn source_worker<B: BusTx>(
    mut bus: B,
    buffer: Arc<Mutex<RingBuffer<u16>>>,
    gate: Receiver<()>,
    config: BridgeConfig,
) -> SourceStats {
    let mut stats = SourceStats::default();

    // Single-use start signal; a closed gate means startup was aborted.
    if gate.recv().is_err() {
        return stats;
    }
    debug!("source worker started");

    let mut scheduler = PeriodicScheduler::start(config.bus_period);
    for k in 0..config.total_samples {
        let sample = k as u16;
        let frame = encode_sample(Channel::Joint1Position, sample);
        if let Err(e) = bus.send(&frame) {
            error!("bus transmit failed, source worker exiting: {}", e);
            stats.bus_errors += 1;
            break;
        }

        if lock_buffer(&buffer).try_write(sample) {
            stats.produced += 1;
        } else {
            stats.dropped += 1;
        }

        scheduler.wait_next();
    }

    debug!(
        "source worker done: produced={} dropped={}",
        stats.produced, stats.dropped
    );
    stats
}

/// Serial-side worker: drain one sample per tick, if there is one.
fn sink_worker<P: Read + Write>(
    mut link: HostLink<P>,
    buffer: Arc<Mutex<RingBuffer<u16>>>,
    gate: Receiver<()>,
    config: BridgeConfig,
) -> SinkStats {
    let mut stats = SinkStats::default();

    if gate.recv().is_err() {
        return stats;
    }
    debug!("sink worker started");

    let mut scheduler = PeriodicScheduler::start(config.host_period);
    for _ in 0..config.total_samples {
        let sample = lock_buffer(&buffer).try_read();
        match sample {
            Some(value) => {
                if let Err(e) = link.send_value(value) {
                    error!("host link write failed, sink worker exiting: {}", e);
                    stats.link_errors += 1;
                    break;
                }
                stats.emitted += 1;
            }
            None => stats.empty_ticks += 1,
        }

        scheduler.wait_next();
    }

    debug!(
        "sink worker done: emitted={} empty_ticks={}",
        stats.emitted, stats.empty_ticks
    );
    stats
}

/// Run the bridge to completion.
///
/// Spawns both workers, releases the source gate, releases the sink gate
/// after the configured delay, and joins both. A worker that fails its
/// transport exits on its own and is still joined here; the counters tell
/// the rest of the story.
pub fn run_bridge<B, P>(
    bus: B,
    link: HostLink<P>,
    buffer: Arc<Mutex<RingBuffer<u16>>>,
    config: &BridgeConfig,
) -> (SourceStats, SinkStats)
where
    B: BusTx + 'static,
    P: Read + Write + Send + 'static,
{
    let (source_gate_tx, source_gate_rx) = bounded::<()>(1);
    let (sink_gate_tx, sink_gate_rx) = bounded::<()>(1);

    let source_buffer = Arc::clone(&buffer);
    let source_config = config.clone();
    let source = thread::Builder::new()
        .name("bus-source".into())
        .spawn(move || source_worker(bus, source_buffer, source_gate_rx, source_config))
        .expect("failed to spawn bus-source thread");

    let sink_buffer = Arc::clone(&buffer);
    let sink_config = config.clone();
    let sink = thread::Builder::new()
        .name("serial-sink".into())
        .spawn(move || sink_worker(link, sink_buffer, sink_gate_rx, sink_config))
        .expect("failed to spawn serial-sink thread");

    // The source gets a head start so draining begins against a partly
    // filled buffer.
    let _ = source_gate_tx.send(());
    thread::sleep(config.sink_start_delay);
    let _ = sink_gate_tx.send(());
    info!(
        "bridge running: {} samples, bus period {:?}, host period {:?}",
        config.total_samples, config.bus_period, config.host_period
    );

    let source_stats = match source.join() {
        Ok(stats) => stats,
        Err(_) => {
            error!("source worker panicked");
            SourceStats::default()
        }
    };
    let sink_stats = match sink.join() {
        Ok(stats) => stats,
        Err(_) => {
            error!("sink worker panicked");
            SinkStats::default()
        }
    };

    (source_stats, sink_stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{decode_value, BusError, BusFrame};
    use std::io;

    struct MockBus {
        sent: Arc<Mutex<Vec<BusFrame>>>,
    }

    impl BusTx for MockBus {
        fn send(&mut self, frame: &BusFrame) -> crate::bus::Result<()> {
            self.sent.lock().unwrap().push(*frame);
            Ok(())
        }
    }

    struct FailingBus;

    impl BusTx for FailingBus {
        fn send(&mut self, _frame: &BusFrame) -> crate::bus::Result<()> {
            Err(BusError::Device("wire fell off".into()))
        }
    }

    struct SharedWriter {
        bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl io::Read for SharedWriter {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "nothing to read"))
        }
    }

    impl io::Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            bus_period: Duration::from_millis(1),
            host_period: Duration::from_millis(3),
            total_samples: 100,
            sink_start_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_end_to_end_ordered_subsequence() {
        // Source pushes 0..99 at a faster period than the sink drains, with
        // a capacity-8 buffer: the emitted stream must be an in-order,
        // duplicate-free subsequence of the written one, and every sample
        // must be accounted for as emitted, dropped, or left in the buffer.
        let sent = Arc::new(Mutex::new(Vec::new()));
        let emitted_bytes = Arc::new(Mutex::new(Vec::new()));
        let buffer = Arc::new(Mutex::new(RingBuffer::new(8)));

        let (source_stats, sink_stats) = run_bridge(
            MockBus { sent: Arc::clone(&sent) },
            HostLink::with_port(SharedWriter {
                bytes: Arc::clone(&emitted_bytes),
            }),
            Arc::clone(&buffer),
            &test_config(),
        );

        // Every tick transmitted its telemetry frame on the bus.
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 100);
        assert_eq!(decode_value(&sent[17]), Some((crate::bus::Channel::Joint1Position, 17)));

        let text = String::from_utf8(emitted_bytes.lock().unwrap().clone()).unwrap();
        let values: Vec<u16> = text
            .split("\r\n")
            .filter(|line| !line.is_empty())
            .map(|line| line.parse().unwrap())
            .collect();

        assert_eq!(values.len() as u64, sink_stats.emitted);
        assert!(!values.is_empty());
        // Strictly increasing = ordered subsequence of 0..99, no duplicates.
        assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(values.iter().all(|&v| v < 100));

        // Accounting: accepted samples either reached the host or are still
        // buffered; nothing vanished.
        let remaining = buffer.lock().unwrap().len() as u64;
        assert_eq!(source_stats.produced, sink_stats.emitted + remaining);
        assert_eq!(source_stats.produced + source_stats.dropped, 100);
        // The sink is slower than the source, so drops must have occurred.
        assert!(source_stats.dropped > 0);
    }

    #[test]
    fn test_source_drops_when_buffer_full() {
        let buffer = Arc::new(Mutex::new(RingBuffer::new(4)));
        let (gate_tx, gate_rx) = bounded(1);
        gate_tx.send(()).unwrap();

        let stats = source_worker(
            MockBus {
                sent: Arc::new(Mutex::new(Vec::new())),
            },
            Arc::clone(&buffer),
            gate_rx,
            BridgeConfig {
                bus_period: Duration::from_micros(200),
                host_period: Duration::from_millis(1),
                total_samples: 10,
                sink_start_delay: Duration::ZERO,
            },
        );

        assert_eq!(stats.produced, 4);
        assert_eq!(stats.dropped, 6);
        assert!(buffer.lock().unwrap().is_full());
    }

    #[test]
    fn test_sink_skips_empty_ticks() {
        let buffer = Arc::new(Mutex::new(RingBuffer::new(4)));
        buffer.lock().unwrap().try_write(42u16);
        let (gate_tx, gate_rx) = bounded(1);
        gate_tx.send(()).unwrap();

        let bytes = Arc::new(Mutex::new(Vec::new()));
        let stats = sink_worker(
            HostLink::with_port(SharedWriter {
                bytes: Arc::clone(&bytes),
            }),
            buffer,
            gate_rx,
            BridgeConfig {
                bus_period: Duration::from_millis(1),
                host_period: Duration::from_micros(200),
                total_samples: 5,
                sink_start_delay: Duration::ZERO,
            },
        );

        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.empty_ticks, 4);
        assert_eq!(
            String::from_utf8(bytes.lock().unwrap().clone()).unwrap(),
            "42\r\n"
        );
    }

    #[test]
    fn test_source_exits_cleanly_on_transport_failure() {
        let buffer = Arc::new(Mutex::new(RingBuffer::new(4)));
        let (gate_tx, gate_rx) = bounded(1);
        gate_tx.send(()).unwrap();

        let stats = source_worker(
            FailingBus,
            buffer,
            gate_rx,
            BridgeConfig {
                bus_period: Duration::from_millis(1),
                host_period: Duration::from_millis(1),
                total_samples: 10,
                sink_start_delay: Duration::ZERO,
            },
        );

        assert_eq!(stats.bus_errors, 1);
        assert_eq!(stats.produced, 0);
    }
}
