// Inbound bus frame dispatch for the drive node.
//
// Three identifiers matter here: the current and position set-point
// channels, and the motor command word carrying enable/mode bits. Every
// other frame on the bus is someone else's traffic and is ignored without
// error.

use tracing::{debug, trace};

use crate::bus::{decode_value, BusFrame, Channel};

use super::state::{ControllerMode, SetpointState};

/// Motor command word layout (shared with the master node).
pub const MODE_POSITION_BIT: i32 = 0x01;
pub const MOTOR_1_ENABLE: i32 = 0x02;
pub const MOTOR_2_ENABLE: i32 = 0x08;
pub const MOTOR_3_ENABLE: i32 = 0x20;

/// Route one inbound frame into the shared set-point state.
///
/// Returns true when the frame was consumed. The stored references are read
/// by the next control tick; a mode command takes effect at that tick
/// boundary, not mid-tick.
pub fn route_frame(state: &SetpointState, frame: &BusFrame) -> bool {
    let Some((channel, value)) = decode_value(frame) else {
        trace!("ignoring frame with unknown id 0x{:X}", frame.id);
        return false;
    };

    match channel {
        Channel::CurrentSetpoint => {
            state.set_current_ref_ma(value as i16);
            trace!("current reference updated to {} mA", value as i16);
            true
        }
        Channel::PositionSetpoint => {
            state.set_position_ref(value);
            trace!("position reference updated to {}", value);
            true
        }
        Channel::MotorCommand => {
            let mode = command_word_mode(value);
            state.set_mode(mode);
            debug!("motor command 0x{:X} -> {:?}", value, mode);
            true
        }
        _ => {
            trace!("ignoring frame on channel {:?}", channel);
            false
        }
    }
}

/// Decode the enable/mode bits of a motor command word.
fn command_word_mode(word: i32) -> ControllerMode {
    if word & MOTOR_1_ENABLE == 0 {
        ControllerMode::Idle
    } else if word & MODE_POSITION_BIT != 0 {
        ControllerMode::PositionControl
    } else {
        ControllerMode::CurrentControl
    }
}
