// Host-facing serial link.
//
// Plain-text framing: one decimal value per line, CR-LF terminated. The
// first line ever sent is the ring-buffer capacity, which the host uses to
// size its receive buffer; the host answers with a single byte, '1' to
// grant write permission.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

/// Default serial configuration for the host link
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// Reply byte that grants write permission.
const PERMISSION_GRANTED: u8 = b'1';

/// Error types for the host link
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for the host handshake reply")]
    Timeout,

    #[error("Host denied write permission (reply byte 0x{reply:02X})")]
    WriteDenied { reply: u8 },
}

pub type Result<T> = std::result::Result<T, HostError>;

/// Line-oriented writer over the host serial port.
pub struct HostLink<P> {
    port: P,
}

impl HostLink<Box<dyn SerialPort>> {
    /// Open a new connection to the host
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }
}

impl<P: Read + Write> HostLink<P> {
    /// Wrap an already-open port (used by tests with in-memory ports).
    pub fn with_port(port: P) -> Self {
        Self { port }
    }

    /// Announce the buffer capacity and wait for write permission.
    ///
    /// Anything other than a '1' reply aborts startup; the host sizing its
    /// receive buffer wrong would corrupt every later line.
    pub fn handshake(&mut self, capacity: usize) -> Result<()> {
        debug!("announcing buffer capacity {} to host", capacity);
        self.write_line(capacity as u64)?;

        let mut reply = [0u8; 1];
        self.port.read_exact(&mut reply).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                HostError::Timeout
            } else {
                HostError::Io(e)
            }
        })?;

        if reply[0] != PERMISSION_GRANTED {
            return Err(HostError::WriteDenied { reply: reply[0] });
        }
        info!("host granted write permission");
        Ok(())
    }

    /// Emit one sample as a decimal line.
    pub fn send_value(&mut self, value: u16) -> Result<()> {
        self.write_line(value as u64)
    }

    fn write_line(&mut self, value: u64) -> Result<()> {
        let line = format!("{}\r\n", value);
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }
}
