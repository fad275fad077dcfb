// Motor drive module for the hopper leg actuator
//
// Provides:
// - Copley Accelus checksum-framed packet protocol
// - Request/response engine for mode and current set-points

pub mod copley;
mod driver;

#[cfg(test)]
pub(crate) mod testing;

pub use copley::{build_packet, parse_packet, MotorPacket, Opcode, ProtocolError};
pub use driver::{CopleyDrive, DriveMode, DEFAULT_BAUDRATE, DEFAULT_NODE, DEFAULT_TIMEOUT_MS};
