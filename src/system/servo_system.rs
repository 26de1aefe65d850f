//! Servo session: spawns the two capture threads and the controller thread
//! and wires a camera link between each worker and the controller.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::config::Config;
use crate::robot::RobotLink;
use crate::vision::{CameraSource, Segmenter};

use super::capture_worker::{WorkerReport, run_camera};
use super::controller::{ControlReport, Controller};
use super::messages::CameraRole;
use super::rendezvous::camera_link;

/// Everything the three threads reported.
#[derive(Debug, Clone, Copy)]
pub struct SessionReport {
    pub top: WorkerReport,
    pub bottom: WorkerReport,
    pub control: ControlReport,
}

pub struct ServoSystem {
    top: JoinHandle<WorkerReport>,
    bottom: JoinHandle<WorkerReport>,
    controller: JoinHandle<crate::error::Result<ControlReport>>,
}

impl ServoSystem {
    /// Start a session.
    ///
    /// Each `open_*` closure runs on its worker's own thread and returns the
    /// camera and segmenter for that thread, so capture devices are created
    /// where they are used.
    pub fn start<CT, ST, FT, CB, SB, FB>(
        config: Arc<Config>,
        link: RobotLink,
        open_top: FT,
        open_bottom: FB,
    ) -> Result<Self>
    where
        CT: CameraSource,
        ST: Segmenter,
        FT: FnOnce() -> crate::error::Result<(CT, ST)> + Send + 'static,
        CB: CameraSource,
        SB: Segmenter,
        FB: FnOnce() -> crate::error::Result<(CB, SB)> + Send + 'static,
    {
        let capacity = config.capture.channel_capacity;
        let (top_tx, top_rx) = camera_link(capacity);
        let (bottom_tx, bottom_rx) = camera_link(capacity);

        let controller = {
            let config = config.clone();
            thread::Builder::new()
                .name("controller".into())
                .spawn(move || Controller::new(link, &config.robot).run(top_rx, bottom_rx))
                .context("failed to spawn controller thread")?
        };
        let top = {
            let config = config.clone();
            thread::Builder::new()
                .name("capture-top".into())
                .spawn(move || run_camera(CameraRole::Top, open_top, &config, top_tx))
                .context("failed to spawn top capture thread")?
        };
        let bottom = thread::Builder::new()
            .name("capture-bottom".into())
            .spawn(move || run_camera(CameraRole::Bottom, open_bottom, &config, bottom_tx))
            .context("failed to spawn bottom capture thread")?;

        info!(capacity, "servo session started");
        Ok(Self {
            top,
            bottom,
            controller,
        })
    }

    /// Wait for all three threads. The controller's error, if any, is the
    /// session's error, reported only once both workers have stopped.
    pub fn join(self) -> Result<SessionReport> {
        let control = self
            .controller
            .join()
            .map_err(|_| anyhow!("controller thread panicked"));
        let top = self
            .top
            .join()
            .map_err(|_| anyhow!("top capture thread panicked"));
        let bottom = self
            .bottom
            .join()
            .map_err(|_| anyhow!("bottom capture thread panicked"));

        let control = control?.context("control loop failed")?;
        let (top, bottom) = (top?, bottom?);

        info!(
            top_cycles = top.cycles,
            bottom_cycles = bottom.cycles,
            moves = control.moves,
            "servo session finished"
        );
        Ok(SessionReport {
            top,
            bottom,
            control,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::link::testing::*;
    use crate::system::capture_worker::testing::{FixedSegmenter, ScriptedCamera};

    fn quick_config() -> Arc<Config> {
        let mut config = Config::default();
        config.robot = quick_robot_config();
        config.capture.frame_skip = 1;
        Arc::new(config)
    }

    #[test]
    fn test_session_runs_to_end_of_stream_and_homes() {
        let config = quick_config();
        let (transport, recording) = RecordingTransport::new();
        let link = RobotLink::new(Box::new(transport), &config.robot);

        let system = ServoSystem::start(
            config.clone(),
            link,
            || Ok((ScriptedCamera::numbered(5), FixedSegmenter::missing())),
            || Ok((ScriptedCamera::numbered(5), FixedSegmenter::missing())),
        )
        .unwrap();
        let report = system.join().unwrap();

        assert_eq!(report.top.cycles, 5);
        assert_eq!(report.bottom.cycles, 5);
        assert_eq!(report.control.cycles, 5);
        assert_eq!(report.control.moves, 0);
        let commands = recording.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1].pose, config.robot.home);
        assert!(recording.is_closed());
    }

    #[test]
    fn test_shorter_stream_ends_session() {
        let config = quick_config();
        let (transport, recording) = RecordingTransport::new();
        let link = RobotLink::new(Box::new(transport), &config.robot);

        let system = ServoSystem::start(
            config,
            link,
            || Ok((ScriptedCamera::numbered(2), FixedSegmenter::missing())),
            || Ok((ScriptedCamera::numbered(40), FixedSegmenter::missing())),
        )
        .unwrap();
        let report = system.join().unwrap();

        assert_eq!(report.top.cycles, 2);
        assert_eq!(report.control.cycles, 2);
        assert!(report.bottom.cycles < 40);
        assert!(recording.is_closed());
    }

    #[test]
    fn test_missing_camera_ends_session_cleanly() {
        let config = quick_config();
        let (transport, recording) = RecordingTransport::new();
        let link = RobotLink::new(Box::new(transport), &config.robot);

        let system = ServoSystem::start(
            config,
            link,
            || -> crate::error::Result<(ScriptedCamera, FixedSegmenter)> {
                Err(crate::error::ServoError::CaptureFault("no device".into()))
            },
            || Ok((ScriptedCamera::numbered(3), FixedSegmenter::missing())),
        )
        .unwrap();
        let report = system.join().unwrap();

        assert_eq!(report.top.cycles, 0);
        assert_eq!(report.control.cycles, 0);
        assert!(recording.is_closed());
    }

    #[test]
    fn test_controller_failure_still_joins_workers() {
        let config = quick_config();
        let (transport, recording) = RecordingTransport::failing_after(0);
        let link = RobotLink::new(Box::new(transport), &config.robot);

        let top_camera = ScriptedCamera::numbered(30);
        let bottom_camera = ScriptedCamera::numbered(30);
        let (top_released, bottom_released) =
            (top_camera.released.clone(), bottom_camera.released.clone());

        let system = ServoSystem::start(
            config,
            link,
            move || Ok((top_camera, FixedSegmenter::missing())),
            move || Ok((bottom_camera, FixedSegmenter::missing())),
        )
        .unwrap();
        let err = system.join().unwrap_err();

        assert!(format!("{err:#}").contains("control loop failed"));
        assert!(*top_released.lock());
        assert!(*bottom_released.lock());
        assert!(recording.commands().is_empty());
        assert!(recording.is_closed());
    }
}
