// Copley Accelus binary serial protocol: packet layout and checksum.
//
// Packet format: [Opcode, Node, Length, Params..., Checksum]
// Checksum is the XOR of every preceding byte, folded with 0x5A.
//
// This module is pure: it builds and validates byte packets, the transport
// in `driver` moves them.

/// Maximum parameter bytes in one packet.
pub const MAX_PAYLOAD: usize = 8;

/// Checksum fold constant.
const CHECKSUM_SEED: u8 = 0x5A;

/// Bytes before the payload: opcode, node address, payload length.
pub const HEADER_LEN: usize = 3;

/// Instruction set of the Accelus drive.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    NoOp = 0,
    RetrieveMode = 7,
    GetFlashCrc = 10,
    SwapOpModes = 11,
    GetVar = 12,
    SetVar = 13,
    CopyVar = 14,
    Trace = 15,
    Reset = 16,
    Trajectory = 17,
    ErrorLog = 18,
    CvmCommand = 20,
    EncoderCommand = 27,
    GetCanObject = 28,
    SetCanObject = 29,
    DynamicFile = 33,
}

impl Opcode {
    pub fn from_raw(raw: u8) -> Option<Opcode> {
        match raw {
            0 => Some(Opcode::NoOp),
            7 => Some(Opcode::RetrieveMode),
            10 => Some(Opcode::GetFlashCrc),
            11 => Some(Opcode::SwapOpModes),
            12 => Some(Opcode::GetVar),
            13 => Some(Opcode::SetVar),
            14 => Some(Opcode::CopyVar),
            15 => Some(Opcode::Trace),
            16 => Some(Opcode::Reset),
            17 => Some(Opcode::Trajectory),
            18 => Some(Opcode::ErrorLog),
            20 => Some(Opcode::CvmCommand),
            27 => Some(Opcode::EncoderCommand),
            28 => Some(Opcode::GetCanObject),
            29 => Some(Opcode::SetCanObject),
            33 => Some(Opcode::DynamicFile),
            _ => None,
        }
    }
}

/// Drive register addresses used by this runtime.
///
/// RAM-bank addresses from the drive register map; values are little-endian
/// on the wire.
pub const VAR_COMMANDED_CURRENT: u8 = 0x02; // i16, milliamps
pub const VAR_DESIRED_STATE: u8 = 0x24; // u16, mode code

/// Error types for Copley communication
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Malformed packet: {reason}")]
    Framing { reason: String },

    #[error("Unknown opcode 0x{opcode:02X}")]
    UnknownOpcode { opcode: u8 },

    #[error("Unexpected response opcode: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedOpcode { expected: u8, actual: u8 },

    #[error("Response from wrong node: expected {expected}, got {actual}")]
    NodeMismatch { expected: u8, actual: u8 },

    #[error("Invalid response from node {node}: {reason}")]
    InvalidResponse { node: u8, reason: String },

    #[error("Timeout waiting for response from node {node}")]
    Timeout { node: u8 },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// One validated packet off the drive link.
///
/// The opcode is kept raw: a packet with an opcode outside the instruction
/// set still parses (callers may log it and move on), and `opcode()` reports
/// the failure only when a typed opcode is actually needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPacket {
    raw_opcode: u8,
    node: u8,
    payload: [u8; MAX_PAYLOAD],
    payload_len: u8,
}

impl MotorPacket {
    pub fn raw_opcode(&self) -> u8 {
        self.raw_opcode
    }

    pub fn opcode(&self) -> Result<Opcode> {
        Opcode::from_raw(self.raw_opcode).ok_or(ProtocolError::UnknownOpcode {
            opcode: self.raw_opcode,
        })
    }

    pub fn node(&self) -> u8 {
        self.node
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len as usize]
    }
}

/// Calculate the checksum over every byte that precedes it in the packet.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b) ^ CHECKSUM_SEED
}

/// Build a packet: opcode, node, length, payload, trailing checksum.
///
/// Payloads longer than 8 bytes are a programming error, not a runtime
/// condition, so this asserts.
pub fn build_packet(opcode: Opcode, node: u8, payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_PAYLOAD,
        "packet payload limited to {} bytes, got {}",
        MAX_PAYLOAD,
        payload.len()
    );

    let mut packet = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
    packet.push(opcode as u8);
    packet.push(node);
    packet.push(payload.len() as u8);
    packet.extend_from_slice(payload);
    packet.push(checksum(&packet));
    packet
}

/// Parse and validate a complete packet.
///
/// The declared payload length must be 0..=8 and consistent with the slice,
/// and the recomputed checksum must match the trailing byte. The opcode is
/// not validated here; see `MotorPacket::opcode`.
pub fn parse_packet(bytes: &[u8]) -> Result<MotorPacket> {
    if bytes.len() < HEADER_LEN + 1 {
        return Err(ProtocolError::Framing {
            reason: format!("packet too short: {} bytes", bytes.len()),
        });
    }

    let declared_len = bytes[2] as usize;
    if declared_len > MAX_PAYLOAD {
        return Err(ProtocolError::Framing {
            reason: format!("payload length {} exceeds {}", declared_len, MAX_PAYLOAD),
        });
    }
    if bytes.len() != HEADER_LEN + declared_len + 1 {
        return Err(ProtocolError::Framing {
            reason: format!(
                "length byte says {} payload bytes but packet is {} bytes",
                declared_len,
                bytes.len()
            ),
        });
    }

    let expected = checksum(&bytes[..bytes.len() - 1]);
    let actual = bytes[bytes.len() - 1];
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }

    let mut payload = [0u8; MAX_PAYLOAD];
    payload[..declared_len].copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + declared_len]);

    Ok(MotorPacket {
        raw_opcode: bytes[0],
        node: bytes[1],
        payload,
        payload_len: declared_len as u8,
    })
}
