//! Binary instruction frames for the arm controller.
//!
//! Every command is a fixed 48-byte frame carrying the absolute target pose
//! and feed speed as little-endian IEEE-754 binary32 values. The controller
//! never answers, so nothing here parses inbound traffic.

use crate::error::{Result, ServoError};
use crate::robot::pose::ArmPose;

pub const FRAME_LEN: usize = 48;

pub const HEADER: u8 = 238;
pub const FRAME_TYPE: u8 = b'1';
pub const OPCODE_MOVE: u8 = 1;
pub const TAIL: u8 = 239;

const X_OFFSET: usize = 3;
const Y_OFFSET: usize = 7;
const Z_OFFSET: usize = 11;
const J5_OFFSET: usize = 15;
const J6_OFFSET: usize = 23;
const SPEED_OFFSET: usize = 43;

pub type InstructionFrame = [u8; FRAME_LEN];

/// Absolute move: target pose plus speed in mm/min.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCommand {
    pub pose: ArmPose,
    pub speed: f32,
}

/// Build a movement frame. Homing uses the same opcode with the home pose.
pub fn encode(pose: &ArmPose, speed: f32) -> InstructionFrame {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = HEADER;
    frame[1] = FRAME_TYPE;
    frame[2] = OPCODE_MOVE;
    put_f32(&mut frame, X_OFFSET, pose.x_mm);
    put_f32(&mut frame, Y_OFFSET, pose.y_mm);
    put_f32(&mut frame, Z_OFFSET, pose.z_mm);
    put_f32(&mut frame, J5_OFFSET, pose.j5_deg);
    put_f32(&mut frame, J6_OFFSET, pose.j6_deg);
    put_f32(&mut frame, SPEED_OFFSET, speed);
    frame[FRAME_LEN - 1] = TAIL;
    frame
}

/// Parse a frame back into its command, checking markers and reserved bytes.
pub fn decode(bytes: &[u8]) -> Result<MoveCommand> {
    if bytes.len() != FRAME_LEN {
        return Err(ServoError::Protocol(format!(
            "expected {FRAME_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != HEADER || bytes[FRAME_LEN - 1] != TAIL {
        return Err(ServoError::Protocol(format!(
            "bad markers head={} tail={}",
            bytes[0],
            bytes[FRAME_LEN - 1]
        )));
    }
    if bytes[1] != FRAME_TYPE || bytes[2] != OPCODE_MOVE {
        return Err(ServoError::Protocol(format!(
            "unsupported frame type {:#04x} opcode {}",
            bytes[1], bytes[2]
        )));
    }
    let reserved_nonzero = bytes[19..23]
        .iter()
        .chain(&bytes[27..43])
        .any(|&b| b != 0);
    if reserved_nonzero {
        return Err(ServoError::Protocol("reserved bytes are not zero".into()));
    }

    Ok(MoveCommand {
        pose: ArmPose {
            j6_deg: get_f32(bytes, J6_OFFSET),
            j5_deg: get_f32(bytes, J5_OFFSET),
            x_mm: get_f32(bytes, X_OFFSET),
            y_mm: get_f32(bytes, Y_OFFSET),
            z_mm: get_f32(bytes, Z_OFFSET),
        },
        speed: get_f32(bytes, SPEED_OFFSET),
    })
}

fn put_f32(frame: &mut InstructionFrame, offset: usize, value: f32) {
    frame[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_f32(bytes: &[u8], offset: usize) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    f32::from_le_bytes(raw)
}
