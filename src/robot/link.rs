//! Serial link to the arm controller.
//!
//! `RobotLink` is the only owner of the transport and of the commanded
//! `ArmPose`. Frames are written blocking and fire-and-forget; the transport
//! is released by `close()` or, failing that, when the link is dropped.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};
use tracing::{debug, info, warn};

use crate::config::RobotConfig;
use crate::error::{Result, ServoError};
use crate::robot::pose::{ArmPose, PoseDelta};
use crate::robot::protocol::{self, InstructionFrame};

/// Byte sink for instruction frames.
pub trait Transport: Send {
    fn send(&mut self, frame: &InstructionFrame) -> io::Result<()>;

    /// Flush and release the underlying device.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 8-N-1 serial port without flow control.
pub struct SerialTransport {
    port: SerialPort,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> io::Result<Self> {
        let port = SerialPort::open(path, |mut settings: Settings| {
            settings.set_raw();
            settings.set_baud_rate(baud_rate)?;
            settings.set_char_size(CharSize::Bits8);
            settings.set_stop_bits(StopBits::One);
            settings.set_parity(Parity::None);
            settings.set_flow_control(FlowControl::None);
            Ok(settings)
        })?;
        info!(path, baud_rate, "serial link open");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, frame: &InstructionFrame) -> io::Result<()> {
        self.port.write_all(frame)
    }

    fn close(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

/// Dry-run sink: decodes and logs every frame instead of writing it.
#[derive(Default)]
pub struct LogTransport {
    sent: u64,
}

impl Transport for LogTransport {
    fn send(&mut self, frame: &InstructionFrame) -> io::Result<()> {
        self.sent += 1;
        match protocol::decode(frame) {
            Ok(cmd) => info!(
                seq = self.sent,
                j6 = cmd.pose.j6_deg,
                j5 = cmd.pose.j5_deg,
                x = cmd.pose.x_mm,
                y = cmd.pose.y_mm,
                z = cmd.pose.z_mm,
                speed = cmd.speed,
                "dry-run frame"
            ),
            Err(e) => warn!(seq = self.sent, error = %e, "dry-run frame does not decode"),
        }
        Ok(())
    }
}

pub struct RobotLink {
    transport: Option<Box<dyn Transport>>,
    pose: ArmPose,
    home: ArmPose,
    home_speed: f32,
    cruise_speed: f32,
    home_settle: Duration,
    frames_sent: u64,
}

impl RobotLink {
    /// Take ownership of an open transport. The pose starts at home.
    pub fn new(transport: Box<dyn Transport>, robot: &RobotConfig) -> Self {
        Self {
            transport: Some(transport),
            pose: robot.home,
            home: robot.home,
            home_speed: robot.home_speed,
            cruise_speed: robot.cruise_speed,
            home_settle: robot.home_settle(),
            frames_sent: 0,
        }
    }

    pub fn pose(&self) -> ArmPose {
        self.pose
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Send the home pose at home speed, then wait for the arm to get there.
    ///
    /// There is no completion feedback; the settle time is an open-loop
    /// assumption about how long homing takes.
    pub fn home(&mut self) -> Result<()> {
        info!("homing");
        let home = self.home;
        self.send(&home, self.home_speed)?;
        self.pose = home;
        thread::sleep(self.home_settle);
        info!("homed");
        Ok(())
    }

    /// Offset the commanded pose and send it at cruise speed.
    pub fn move_by(&mut self, delta: PoseDelta) -> Result<()> {
        let mut target = self.pose;
        target += delta;
        self.send(&target, self.cruise_speed)?;
        self.pose = target;
        debug!(
            j6 = target.j6_deg,
            j5 = target.j5_deg,
            x = target.x_mm,
            y = target.y_mm,
            z = target.z_mm,
            "arm moved"
        );
        Ok(())
    }

    /// Flush and release the transport.
    pub fn close(mut self) -> Result<()> {
        self.release().map_err(ServoError::TransportFault)
    }

    fn send(&mut self, pose: &ArmPose, speed: f32) -> Result<()> {
        let transport = self.transport.as_mut().ok_or_else(|| {
            ServoError::TransportFault(io::Error::new(
                io::ErrorKind::NotConnected,
                "robot link already closed",
            ))
        })?;
        let frame = protocol::encode(pose, speed);
        transport.send(&frame).map_err(ServoError::TransportFault)?;
        self.frames_sent += 1;
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        match self.transport.take() {
            Some(mut transport) => {
                let result = transport.close();
                info!(frames = self.frames_sent, "robot link closed");
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for RobotLink {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release robot link");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::robot::protocol::MoveCommand;

    /// Shared view of everything a `RecordingTransport` saw.
    #[derive(Clone, Default)]
    pub struct Recording {
        pub frames: Arc<Mutex<Vec<InstructionFrame>>>,
        pub closed: Arc<Mutex<bool>>,
    }

    impl Recording {
        pub fn commands(&self) -> Vec<MoveCommand> {
            self.frames
                .lock()
                .iter()
                .map(|f| protocol::decode(f).unwrap())
                .collect()
        }

        pub fn is_closed(&self) -> bool {
            *self.closed.lock()
        }
    }

    /// In-memory transport that can be told to fail after N frames.
    pub struct RecordingTransport {
        recording: Recording,
        fail_after: Option<usize>,
    }

    impl RecordingTransport {
        pub fn new() -> (Self, Recording) {
            let recording = Recording::default();
            (
                Self {
                    recording: recording.clone(),
                    fail_after: None,
                },
                recording,
            )
        }

        pub fn failing_after(frames: usize) -> (Self, Recording) {
            let (mut transport, recording) = Self::new();
            transport.fail_after = Some(frames);
            (transport, recording)
        }
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, frame: &InstructionFrame) -> io::Result<()> {
            let mut frames = self.recording.frames.lock();
            if let Some(limit) = self.fail_after {
                if frames.len() >= limit {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
                }
            }
            frames.push(*frame);
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            *self.recording.closed.lock() = true;
            Ok(())
        }
    }

    pub fn quick_robot_config() -> RobotConfig {
        RobotConfig {
            home_settle_ms: 0,
            shutdown_grace_ms: 0,
            ..RobotConfig::default()
        }
    }
}
