// Field bus layer: frame type, channel codec, and transport seams.
//
// Provides:
// - Fixed-format `BusFrame` and the reserved channel table
// - Little-endian value codec between channels and frames
// - `BusTx`/`BusRx` transport traits with a SocketCAN implementation

pub mod channels;
pub mod frame;
#[cfg(target_os = "linux")]
pub mod socket;

pub use channels::{decode_value, encode_sample, encode_value, Channel};
pub use frame::BusFrame;
#[cfg(target_os = "linux")]
pub use socket::{SocketCanRx, SocketCanTx};

use std::time::Duration;

/// Error types for field bus communication
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("CAN device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for a bus frame")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, BusError>;

/// Transmit side of the bus. Fire-and-forget; the kernel queues the frame.
pub trait BusTx: Send {
    fn send(&mut self, frame: &BusFrame) -> Result<()>;
}

/// Receive side of the bus.
///
/// `recv` blocks for at most the handle's configured read timeout and
/// returns `BusError::Timeout` when nothing arrived, so callers with a
/// period deadline can drain the bus without risking an unbounded wait.
pub trait BusRx: Send {
    fn recv(&mut self) -> Result<BusFrame>;

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;
}
