//! Arm pose bookkeeping, instruction frame codec and the serial link.

pub mod link;
pub mod pose;
pub mod protocol;

pub use link::{LogTransport, RobotLink, SerialTransport, Transport};
pub use pose::{ArmPose, PoseDelta};
pub use protocol::{InstructionFrame, MoveCommand};
