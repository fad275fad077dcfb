// Request/response engine for the Copley Accelus drive.
//
// Each call builds one packet, transmits it, and reads exactly one response
// within the port's timeout. There is no internal retry: repeating a
// stateful drive command is not always safe, so retry policy stays with the
// caller (the control tick).

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

use super::copley::{
    build_packet, parse_packet, MotorPacket, Opcode, ProtocolError, Result, HEADER_LEN,
    MAX_PAYLOAD, VAR_COMMANDED_CURRENT, VAR_DESIRED_STATE,
};

/// Default serial configuration for the drive link
pub const DEFAULT_BAUDRATE: u32 = 9_600;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Drive node address on the point-to-point link.
pub const DEFAULT_NODE: u8 = 0;

/// Operating modes of the drive, as desired-state codes on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    Disabled = 0,
    Current = 1,
    Position = 21,
}

impl DriveMode {
    pub fn from_raw(raw: u16) -> Option<DriveMode> {
        match raw {
            0 => Some(DriveMode::Disabled),
            1 => Some(DriveMode::Current),
            21 => Some(DriveMode::Position),
            _ => None,
        }
    }
}

/// Drive link - handles packet exchange with one Copley node
pub struct CopleyDrive<P> {
    port: P,
    node: u8,
}

impl CopleyDrive<Box<dyn SerialPort>> {
    /// Open a new connection to the drive
    pub fn open(port_name: &str, node: u8) -> Result<Self> {
        Self::open_with_baudrate(port_name, node, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, node: u8, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port, node })
    }

    /// Change the response timeout for subsequent requests.
    pub fn set_response_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }
}

impl<P: Read + Write> CopleyDrive<P> {
    /// Wrap an already-open port (used by tests with in-memory ports).
    pub fn with_port(port: P, node: u8) -> Self {
        Self { port, node }
    }

    pub fn node(&self) -> u8 {
        self.node
    }

    /// Switch the drive's operating mode.
    pub fn set_mode(&mut self, mode: DriveMode) -> Result<()> {
        debug!("set drive mode {:?} on node {}", mode, self.node);
        self.write_var(VAR_DESIRED_STATE, mode as u8 as u16)?;
        Ok(())
    }

    /// Query the drive's operating mode.
    pub fn get_mode(&mut self) -> Result<DriveMode> {
        let response = self.transact(Opcode::RetrieveMode, &[])?;
        let raw = read_u16_le(&response, self.node)?;
        DriveMode::from_raw(raw).ok_or_else(|| ProtocolError::InvalidResponse {
            node: self.node,
            reason: format!("unknown mode code {}", raw),
        })
    }

    /// Command a reference current in milliamps.
    pub fn set_current_ma(&mut self, current_ma: i16) -> Result<()> {
        debug!("set current to {} mA on node {}", current_ma, self.node);
        self.write_var(VAR_COMMANDED_CURRENT, current_ma as u16)?;
        Ok(())
    }

    /// Read back the commanded current in milliamps.
    pub fn get_current_ma(&mut self) -> Result<i16> {
        let response = self.transact(Opcode::GetVar, &[VAR_COMMANDED_CURRENT])?;
        Ok(read_u16_le(&response, self.node)? as i16)
    }

    /// Command a trajectory position, in encoder counts.
    pub fn command_position(&mut self, position: i32) -> Result<()> {
        debug!("command position {} on node {}", position, self.node);
        self.transact(Opcode::Trajectory, &position.to_le_bytes())?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Write a 16-bit drive register (little-endian value).
    fn write_var(&mut self, var: u8, value: u16) -> Result<MotorPacket> {
        let [lo, hi] = value.to_le_bytes();
        self.transact(Opcode::SetVar, &[var, lo, hi])
    }

    /// Send one request and read back its validated response.
    ///
    /// Responses echo the request opcode and node address; a response that
    /// does not is rejected, so a stale reply from an earlier exchange can
    /// never be mistaken for this one.
    fn transact(&mut self, opcode: Opcode, payload: &[u8]) -> Result<MotorPacket> {
        let request = build_packet(opcode, self.node, payload);
        self.port.write_all(&request)?;
        self.port.flush()?;

        let response = self.read_response()?;
        if response.node() != self.node {
            return Err(ProtocolError::NodeMismatch {
                expected: self.node,
                actual: response.node(),
            });
        }
        if response.raw_opcode() != opcode as u8 {
            return Err(ProtocolError::UnexpectedOpcode {
                expected: opcode as u8,
                actual: response.raw_opcode(),
            });
        }
        Ok(response)
    }

    /// Read one packet off the link: header first, then exactly the number
    /// of payload bytes the length field declares, then the checksum.
    fn read_response(&mut self) -> Result<MotorPacket> {
        let mut header = [0u8; HEADER_LEN];
        self.read_exact_mapped(&mut header)?;

        let declared_len = header[2] as usize;
        if declared_len > MAX_PAYLOAD {
            return Err(ProtocolError::Framing {
                reason: format!("payload length {} exceeds {}", declared_len, MAX_PAYLOAD),
            });
        }

        let mut packet = [0u8; HEADER_LEN + MAX_PAYLOAD + 1];
        packet[..HEADER_LEN].copy_from_slice(&header);
        let total = HEADER_LEN + declared_len + 1;
        self.read_exact_mapped(&mut packet[HEADER_LEN..total])?;

        parse_packet(&packet[..total])
    }

    fn read_exact_mapped(&mut self, buf: &mut [u8]) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ProtocolError::Timeout { node: self.node }
            } else {
                ProtocolError::Io(e)
            }
        })
    }
}

fn read_u16_le(packet: &MotorPacket, node: u8) -> Result<u16> {
    let payload = packet.payload();
    if payload.len() < 2 {
        return Err(ProtocolError::InvalidResponse {
            node,
            reason: format!("expected 2 payload bytes, got {}", payload.len()),
        });
    }
    Ok(u16::from_le_bytes([payload[0], payload[1]]))
}
