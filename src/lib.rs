// Runtime for the hopper test rig.
//
// Bridges CAN telemetry onto a host serial link through a bounded ring
// buffer, and commands a Copley motor drive over a checksum-framed packet
// protocol with a mode-driven control loop.

pub mod bridge;
pub mod bus;
pub mod config;
pub mod control;
pub mod motor;
pub mod runtime;
