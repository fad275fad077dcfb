// SocketCAN transport for the field bus.
//
// The interface (bitrate, up/down state) is configured by system tooling
// (`ip link`), not here. TX and RX roles get separate socket handles so the
// source worker and the control context never contend for one descriptor.

use std::io;
use std::time::Duration;

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket, StandardId};
use tracing::trace;

use super::frame::BusFrame;
use super::{BusError, BusRx, BusTx, Result};

fn open_socket(interface: &str) -> Result<CanSocket> {
    CanSocket::open(interface).map_err(|e| {
        BusError::Device(format!("failed to open CAN interface '{}': {}", interface, e))
    })
}

fn to_can_frame(frame: &BusFrame) -> Result<CanFrame> {
    let can_frame = if frame.extended {
        ExtendedId::new(frame.id).and_then(|id| CanFrame::new(id, frame.data()))
    } else {
        StandardId::new(frame.id as u16).and_then(|id| CanFrame::new(id, frame.data()))
    };
    can_frame.ok_or_else(|| BusError::Device(format!("invalid CAN frame, id 0x{:X}", frame.id)))
}

fn from_can_frame(frame: &CanFrame) -> BusFrame {
    BusFrame {
        id: frame.raw_id(),
        data: {
            let mut data = [0u8; 8];
            data[..frame.data().len()].copy_from_slice(frame.data());
            data
        },
        len: frame.data().len() as u8,
        extended: frame.is_extended(),
    }
}

/// Transmit-only SocketCAN handle.
pub struct SocketCanTx {
    socket: CanSocket,
    interface: String,
}

impl SocketCanTx {
    pub fn open(interface: &str) -> Result<Self> {
        let socket = open_socket(interface)?;
        trace!("opened CAN TX socket on '{}'", interface);
        Ok(Self {
            socket,
            interface: interface.to_string(),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl BusTx for SocketCanTx {
    fn send(&mut self, frame: &BusFrame) -> Result<()> {
        let can_frame = to_can_frame(frame)?;
        self.socket.write_frame(&can_frame).map_err(BusError::Io)?;
        trace!("sent frame id=0x{:X} len={}", frame.id, frame.len);
        Ok(())
    }
}

/// Receive-only SocketCAN handle with a bounded read timeout.
pub struct SocketCanRx {
    socket: CanSocket,
    interface: String,
}

impl SocketCanRx {
    pub fn open(interface: &str, read_timeout: Duration) -> Result<Self> {
        let socket = open_socket(interface)?;
        socket.set_read_timeout(read_timeout).map_err(BusError::Io)?;
        trace!(
            "opened CAN RX socket on '{}' (read timeout {:?})",
            interface, read_timeout
        );
        Ok(Self {
            socket,
            interface: interface.to_string(),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl BusRx for SocketCanRx {
    fn recv(&mut self) -> Result<BusFrame> {
        loop {
            match self.socket.read_frame() {
                Ok(frame) => {
                    if frame.is_error_frame() {
                        // Error frames carry controller diagnostics, not data.
                        trace!("ignoring CAN error frame on '{}'", self.interface);
                        continue;
                    }
                    return Ok(from_can_frame(&frame));
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Err(BusError::Timeout);
                }
                Err(e) => return Err(BusError::Io(e)),
            }
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(BusError::Io)
    }
}
