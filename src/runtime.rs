// Runtime orchestration.
//
// Opens the transports, performs the host handshake, then runs three
// workers to completion: the control loop (tightest schedule), and the two
// bridge workers gated so the buffer fills before draining starts. Every
// worker is joined before the final report goes out; a worker that lost its
// transport exits on its own and shows up in the counters rather than
// taking the process down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::bridge::{run_bridge, HostError, HostLink, RingBuffer, SinkStats, SourceStats};
use crate::bus::BusError;
use crate::config::Settings;
use crate::control::{control_loop, ControlStats, SetpointState};
use crate::motor::ProtocolError;

/// Error types for runtime startup
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("field bus setup failed: {0}")]
    Bus(#[from] BusError),

    #[error("host link setup failed: {0}")]
    Host(#[from] HostError),

    #[error("drive link setup failed: {0}")]
    Drive(#[from] ProtocolError),
}

/// Final counters reported after all workers are joined.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeReport {
    pub source: SourceStats,
    pub sink: SinkStats,
    pub control: ControlStats,
    /// Samples still in the ring buffer at shutdown.
    pub final_buffer_depth: usize,
}

#[cfg(target_os = "linux")]
pub fn run(settings: &Settings) -> Result<RuntimeReport, RuntimeError> {
    use crate::bridge::host::DEFAULT_BAUDRATE;
    use crate::bus::{SocketCanRx, SocketCanTx};
    use crate::config::CONTROL_RX_TIMEOUT;
    use crate::motor::CopleyDrive;

    info!(
        "starting: bus '{}', host '{}', drive '{}' node {}",
        settings.can_interface, settings.host_port, settings.drive_port, settings.drive_node
    );

    // Transport setup; any failure here is fatal (exit code 1 in main).
    let bus_tx = SocketCanTx::open(&settings.can_interface)?;
    let bus_rx = SocketCanRx::open(&settings.can_interface, CONTROL_RX_TIMEOUT)?;
    let mut drive = CopleyDrive::open(&settings.drive_port, settings.drive_node)?;
    drive.set_response_timeout(Duration::from_millis(settings.response_timeout_ms))?;
    let mut host = HostLink::open(&settings.host_port, DEFAULT_BAUDRATE)?;

    // The host must size its receive buffer before any data flows.
    host.handshake(settings.capacity)?;

    run_workers(settings, bus_tx, bus_rx, drive, host)
}

#[cfg(not(target_os = "linux"))]
pub fn run(_settings: &Settings) -> Result<RuntimeReport, RuntimeError> {
    Err(RuntimeError::Bus(BusError::Device(
        "the field bus requires SocketCAN, which is Linux-only".into(),
    )))
}

/// Spawn the control loop, run the bridge to completion, stop and join the
/// control loop, and assemble the report.
fn run_workers<T, R, P, H>(
    settings: &Settings,
    bus_tx: T,
    bus_rx: R,
    drive: crate::motor::CopleyDrive<P>,
    host: HostLink<H>,
) -> Result<RuntimeReport, RuntimeError>
where
    T: crate::bus::BusTx + 'static,
    R: crate::bus::BusRx + 'static,
    P: std::io::Read + std::io::Write + Send + 'static,
    H: std::io::Read + std::io::Write + Send + 'static,
{
    let state = Arc::new(SetpointState::new());
    let stop = Arc::new(AtomicBool::new(false));
    let buffer = Arc::new(Mutex::new(RingBuffer::new(settings.capacity)));

    let control_state = Arc::clone(&state);
    let control_stop = Arc::clone(&stop);
    let control_config = settings.control_config();
    let control = thread::Builder::new()
        .name("control".into())
        .spawn(move || control_loop(bus_rx, drive, control_state, control_stop, control_config))
        .expect("failed to spawn control thread");

    let (source, sink) = run_bridge(bus_tx, host, Arc::clone(&buffer), &settings.bridge_config());

    // Bridge done; wind the control context down and join it too before
    // reporting anything.
    stop.store(true, Ordering::Release);
    let control = match control.join() {
        Ok(stats) => stats,
        Err(_) => {
            error!("control worker panicked");
            ControlStats::default()
        }
    };

    let final_buffer_depth = match buffer.lock() {
        Ok(guard) => guard.len(),
        Err(poisoned) => poisoned.into_inner().len(),
    };

    info!(
        "done: produced={} dropped={} emitted={} empty_ticks={} buffered={} control_ticks={}",
        source.produced,
        source.dropped,
        sink.emitted,
        sink.empty_ticks,
        final_buffer_depth,
        control.ticks
    );

    Ok(RuntimeReport {
        source,
        sink,
        control,
        final_buffer_depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusFrame, BusRx, BusTx};
    use crate::motor::testing::AckPort;
    use crate::motor::CopleyDrive;
    use clap::Parser;
    use std::io;

    struct NullBus;

    impl BusTx for NullBus {
        fn send(&mut self, _frame: &BusFrame) -> crate::bus::Result<()> {
            Ok(())
        }
    }

    impl BusRx for NullBus {
        fn recv(&mut self) -> crate::bus::Result<BusFrame> {
            Err(BusError::Timeout)
        }

        fn set_read_timeout(&mut self, _timeout: Duration) -> crate::bus::Result<()> {
            Ok(())
        }
    }

    struct NullPort;

    impl io::Read for NullPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "nothing"))
        }
    }

    impl io::Write for NullPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_full_run_joins_all_workers_and_accounts_samples() {
        let settings = Settings::parse_from([
            "hopper-can-runtime",
            "--capacity",
            "8",
            "--samples",
            "50",
            "--bus-period-us",
            "1000",
            "--host-period-us",
            "3000",
            "--control-period-us",
            "1000",
        ]);

        let report = run_workers(
            &settings,
            NullBus,
            NullBus,
            CopleyDrive::with_port(AckPort::new(), 0),
            HostLink::with_port(NullPort),
        )
        .unwrap();

        assert_eq!(report.source.produced + report.source.dropped, 50);
        assert_eq!(
            report.source.produced,
            report.sink.emitted + report.final_buffer_depth as u64
        );
        assert!(report.control.ticks > 0);
    }
}
