// Reserved channel table for the hopper field bus.
//
// Each symbolic telemetry/command quantity maps to one fixed CAN identifier.
// The table only grows by adding rows; renumbering an existing row breaks
// every node on the bus.

use super::frame::BusFrame;

/// Motor enable/mode command word to the drive node.
pub const MOTOR_COMMAND_ID: u32 = 0x0000_0001;

/// Actuated joint angle telemetry.
pub const JOINT_1_POSITION_ID: u32 = 0x0000_2001;
pub const JOINT_2_POSITION_ID: u32 = 0x0000_2002;
pub const JOINT_3_POSITION_ID: u32 = 0x0000_2003;

/// Actuated joint current telemetry.
pub const JOINT_1_CURRENT_ID: u32 = 0x0000_0005;
pub const JOINT_2_CURRENT_ID: u32 = 0x0000_0006;
pub const JOINT_3_CURRENT_ID: u32 = 0x0000_0007;

/// Vertical force from the foot IMU.
pub const IMU_FORCE_Z_ID: u32 = 0x0000_0008;

/// Boom encoder angles.
pub const BOOM_ROLL_ID: u32 = 0x0000_0009;
pub const BOOM_PITCH_ID: u32 = 0x0000_000A;
pub const BOOM_YAW_ID: u32 = 0x0000_000B;

/// Set-point inputs consumed by the drive node.
pub const CURRENT_SETPOINT_ID: u32 = 0x0000_3001;
pub const POSITION_SETPOINT_ID: u32 = 0x0000_4001;

/// Symbolic channels carried on the bus, one per reserved identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    MotorCommand,
    Joint1Position,
    Joint2Position,
    Joint3Position,
    Joint1Current,
    Joint2Current,
    Joint3Current,
    ImuForceZ,
    BoomRoll,
    BoomPitch,
    BoomYaw,
    CurrentSetpoint,
    PositionSetpoint,
}

impl Channel {
    /// The reserved CAN identifier for this channel.
    pub const fn id(self) -> u32 {
        match self {
            Channel::MotorCommand => MOTOR_COMMAND_ID,
            Channel::Joint1Position => JOINT_1_POSITION_ID,
            Channel::Joint2Position => JOINT_2_POSITION_ID,
            Channel::Joint3Position => JOINT_3_POSITION_ID,
            Channel::Joint1Current => JOINT_1_CURRENT_ID,
            Channel::Joint2Current => JOINT_2_CURRENT_ID,
            Channel::Joint3Current => JOINT_3_CURRENT_ID,
            Channel::ImuForceZ => IMU_FORCE_Z_ID,
            Channel::BoomRoll => BOOM_ROLL_ID,
            Channel::BoomPitch => BOOM_PITCH_ID,
            Channel::BoomYaw => BOOM_YAW_ID,
            Channel::CurrentSetpoint => CURRENT_SETPOINT_ID,
            Channel::PositionSetpoint => POSITION_SETPOINT_ID,
        }
    }

    /// Look up the channel for a received identifier.
    ///
    /// Unknown identifiers yield `None`; receivers ignore those frames
    /// rather than erroring, so unrelated traffic can share the bus.
    pub fn from_id(id: u32) -> Option<Channel> {
        match id {
            MOTOR_COMMAND_ID => Some(Channel::MotorCommand),
            JOINT_1_POSITION_ID => Some(Channel::Joint1Position),
            JOINT_2_POSITION_ID => Some(Channel::Joint2Position),
            JOINT_3_POSITION_ID => Some(Channel::Joint3Position),
            JOINT_1_CURRENT_ID => Some(Channel::Joint1Current),
            JOINT_2_CURRENT_ID => Some(Channel::Joint2Current),
            JOINT_3_CURRENT_ID => Some(Channel::Joint3Current),
            IMU_FORCE_Z_ID => Some(Channel::ImuForceZ),
            BOOM_ROLL_ID => Some(Channel::BoomRoll),
            BOOM_PITCH_ID => Some(Channel::BoomPitch),
            BOOM_YAW_ID => Some(Channel::BoomYaw),
            CURRENT_SETPOINT_ID => Some(Channel::CurrentSetpoint),
            POSITION_SETPOINT_ID => Some(Channel::PositionSetpoint),
            _ => None,
        }
    }
}

/// Encode a 32-bit value on a channel, little-endian in bytes 0..4.
pub fn encode_value(channel: Channel, value: i32) -> BusFrame {
    BusFrame::new_extended(channel.id(), &value.to_le_bytes())
}

/// Encode a 16-bit sample on a channel, little-endian in bytes 0..2.
///
/// The bridge's telemetry frames carry two-byte counters; the wider
/// `encode_value` form is for set-points and command words.
pub fn encode_sample(channel: Channel, value: u16) -> BusFrame {
    BusFrame::new_extended(channel.id(), &value.to_le_bytes())
}

/// Decode a frame back into its channel and value.
///
/// Reads up to four payload bytes little-endian, zero-extending shorter
/// payloads, so both encodings above round-trip. Frames with an unknown
/// identifier decode to `None`.
pub fn decode_value(frame: &BusFrame) -> Option<(Channel, i32)> {
    let channel = Channel::from_id(frame.id)?;
    let mut raw = [0u8; 4];
    let n = frame.data().len().min(4);
    raw[..n].copy_from_slice(&frame.data()[..n]);
    Some((channel, i32::from_le_bytes(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        for channel in [
            Channel::MotorCommand,
            Channel::Joint1Position,
            Channel::Joint2Position,
            Channel::Joint3Position,
            Channel::Joint1Current,
            Channel::Joint2Current,
            Channel::Joint3Current,
            Channel::ImuForceZ,
            Channel::BoomRoll,
            Channel::BoomPitch,
            Channel::BoomYaw,
            Channel::CurrentSetpoint,
            Channel::PositionSetpoint,
        ] {
            assert_eq!(Channel::from_id(channel.id()), Some(channel));
        }
    }

    #[test]
    fn test_unknown_id_ignored() {
        assert_eq!(Channel::from_id(0x7FF), None);
        let frame = BusFrame::new_extended(0x7FF, &[1, 2, 3, 4]);
        assert_eq!(decode_value(&frame), None);
    }

    #[test]
    fn test_encode_value_little_endian() {
        let frame = encode_value(Channel::CurrentSetpoint, 0x0403_0201);
        assert_eq!(frame.id, CURRENT_SETPOINT_ID);
        assert_eq!(frame.data(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_encode_value_negative_round_trip() {
        let frame = encode_value(Channel::PositionSetpoint, -1500);
        assert_eq!(
            decode_value(&frame),
            Some((Channel::PositionSetpoint, -1500))
        );
    }

    #[test]
    fn test_sample_round_trip_zero_extends() {
        let frame = encode_sample(Channel::Joint1Position, 0xBEEF);
        assert_eq!(frame.len, 2);
        assert_eq!(decode_value(&frame), Some((Channel::Joint1Position, 0xBEEF)));
    }
}
