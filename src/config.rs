// Timing, capacity, and transport configuration.
//
// The constants are the rig defaults; every one of them is overridable on
// the command line, since timeouts, periods, and the escalation threshold
// are open parameters of the protocol rather than fixed behavior.

use std::time::Duration;

use clap::Parser;

use crate::bridge::BridgeConfig;
use crate::control::ControlConfig;
use crate::motor;

/// Worker periods (microseconds)
pub const BUS_PERIOD_US: u64 = 10_000;
pub const HOST_PERIOD_US: u64 = 50_000;
pub const CONTROL_PERIOD_US: u64 = 1_000;

/// Ring buffer capacity shared with the host at startup
pub const BUFFER_CAPACITY: usize = 32;

/// Fixed sample count after which the bridge workers exit
pub const TOTAL_SAMPLES: u32 = 256;

/// Head start for the source worker before the sink begins draining
pub const SINK_START_DELAY: Duration = Duration::from_millis(100);

/// Read timeout for the control loop's bus drain; short, so routing can
/// never eat the tick deadline
pub const CONTROL_RX_TIMEOUT: Duration = Duration::from_micros(200);

/// Consecutive drive failures tolerated before the tick forces Idle
pub const MAX_PROTOCOL_ERRORS: u32 = 5;

/// Transport defaults
pub const CAN_INTERFACE: &str = "can0";
pub const HOST_PORT: &str = "/dev/ttyS0";
pub const DRIVE_PORT: &str = "/dev/ttyUSB0";

/// Runtime settings, CLI-overridable.
#[derive(Debug, Clone, Parser)]
#[command(name = "hopper-can-runtime")]
#[command(about = "CAN/UART telemetry bridge and motor drive runtime")]
pub struct Settings {
    /// CAN interface for the field bus
    #[arg(long, default_value = CAN_INTERFACE)]
    pub can_interface: String,

    /// Serial port of the host link
    #[arg(long, default_value = HOST_PORT)]
    pub host_port: String,

    /// Serial port of the motor drive link
    #[arg(long, default_value = DRIVE_PORT)]
    pub drive_port: String,

    /// Drive node address on the point-to-point link
    #[arg(long, default_value_t = motor::DEFAULT_NODE)]
    pub drive_node: u8,

    /// Ring buffer capacity (also announced to the host)
    #[arg(long, default_value_t = BUFFER_CAPACITY)]
    pub capacity: usize,

    /// Number of samples to move before shutting down
    #[arg(long, default_value_t = TOTAL_SAMPLES)]
    pub samples: u32,

    /// Source worker period in microseconds
    #[arg(long, default_value_t = BUS_PERIOD_US)]
    pub bus_period_us: u64,

    /// Sink worker period in microseconds
    #[arg(long, default_value_t = HOST_PERIOD_US)]
    pub host_period_us: u64,

    /// Control tick period in microseconds
    #[arg(long, default_value_t = CONTROL_PERIOD_US)]
    pub control_period_us: u64,

    /// Drive response timeout in milliseconds
    #[arg(long, default_value_t = motor::DEFAULT_TIMEOUT_MS)]
    pub response_timeout_ms: u64,

    /// Consecutive drive failures before escalating to Idle
    #[arg(long, default_value_t = MAX_PROTOCOL_ERRORS)]
    pub max_protocol_errors: u32,

    /// Print the final run report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl Settings {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            bus_period: Duration::from_micros(self.bus_period_us),
            host_period: Duration::from_micros(self.host_period_us),
            total_samples: self.samples,
            sink_start_delay: SINK_START_DELAY,
        }
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            period: Duration::from_micros(self.control_period_us),
            max_consecutive_errors: self.max_protocol_errors,
        }
    }
}
