//! Capture worker: one per camera.
//!
//! Reads frames, processes every `frame_skip`-th one through segmentation,
//! ROI cropping and tracking, and publishes exactly one sample per processed
//! frame. Vision problems become typed outcomes; only the camera ending or
//! the controller going away stops the loop.

use opencv::core::Mat;
use opencv::prelude::*;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, ServoError};
use crate::geometry::PixelScale;
use crate::tracking::Tracker;
use crate::vision::{CameraSource, RoiManager, Segmenter, to_gray};

use super::messages::{
    CameraRole, CycleOutcome, Displacement, DisplacementSample, FailureKind, SkipReason,
};
use super::rendezvous::SamplePublisher;

/// Counters from a finished worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub role: CameraRole,
    /// Frames read after the reference frame.
    pub frames_read: u64,
    /// Samples published, end-of-stream excluded.
    pub cycles: u64,
    pub tracked: u64,
}

impl WorkerReport {
    fn empty(role: CameraRole) -> Self {
        Self {
            role,
            frames_read: 0,
            cycles: 0,
            tracked: 0,
        }
    }
}

pub struct CaptureWorker<C: CameraSource, S: Segmenter> {
    role: CameraRole,
    camera: C,
    segmenter: S,
    roi: RoiManager,
    tracker: Tracker,
    scale: PixelScale,
    frame_skip: u64,
    /// Last processed frame, grayscale.
    previous: Mat,
}

impl<C: CameraSource, S: Segmenter> CaptureWorker<C, S> {
    /// Read the reference frame and set up per-camera state.
    ///
    /// The camera is released before returning an error.
    pub fn init(role: CameraRole, mut camera: C, segmenter: S, config: &Config) -> Result<Self> {
        let reference = match camera.read_frame().and_then(|f| to_gray(&f)) {
            Ok(gray) => gray,
            Err(e) => {
                camera.release();
                return Err(e);
            }
        };
        let tracker = match Tracker::new(&config.tracker) {
            Ok(t) => t,
            Err(e) => {
                camera.release();
                return Err(e);
            }
        };
        info!(
            camera = %role,
            width = reference.cols(),
            height = reference.rows(),
            "reference frame captured"
        );

        Ok(Self {
            role,
            camera,
            segmenter,
            roi: RoiManager::new(&config.roi),
            tracker,
            scale: PixelScale::new(config.conversion.scale_mm_per_px),
            frame_skip: config.capture.frame_skip.max(1),
            previous: reference,
        })
    }

    /// Process frames until the camera ends or the controller hangs up.
    pub fn run(mut self, publisher: SamplePublisher) -> WorkerReport {
        let mut report = WorkerReport::empty(self.role);
        let mut index: u64 = 0;
        info!(camera = %self.role, skip = self.frame_skip, "capture running");

        loop {
            let frame = match self.camera.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    info!(camera = %self.role, reason = %e, "camera stream ended");
                    break;
                }
            };
            report.frames_read += 1;
            let this = index;
            index += 1;
            if this % self.frame_skip != 0 {
                continue;
            }

            let outcome = match to_gray(&frame) {
                Ok(gray) => {
                    let outcome = self.process_cycle(&gray);
                    self.previous = gray;
                    outcome
                }
                Err(e) => CycleOutcome::Failed(FailureKind::from(&e)),
            };
            self.log_outcome(report.cycles, this, &outcome);
            if outcome.displacement().is_some() {
                report.tracked += 1;
            }

            let sample = DisplacementSample::Cycle {
                cycle_id: report.cycles,
                outcome,
            };
            if publisher.publish(sample).is_err() {
                warn!(camera = %self.role, "controller gone, stopping capture");
                self.camera.release();
                return report;
            }
            report.cycles += 1;
        }

        if publisher
            .publish(DisplacementSample::EndOfStream {
                cycles: report.cycles,
            })
            .is_err()
        {
            debug!(camera = %self.role, "controller gone before end of stream");
        }
        self.camera.release();
        info!(
            camera = %self.role,
            frames = report.frames_read,
            cycles = report.cycles,
            tracked = report.tracked,
            "capture stopped"
        );
        report
    }

    fn process_cycle(&mut self, gray: &Mat) -> CycleOutcome {
        match self.measure(gray) {
            Ok(displacement) => CycleOutcome::Tracked(displacement),
            Err(ServoError::SegmentationMiss) => {
                if self.roi.record_miss() {
                    info!(camera = %self.role, "target lost, ROI window reset");
                }
                CycleOutcome::Skipped(SkipReason::NoRegion)
            }
            Err(e) => {
                if !e.is_recoverable() {
                    error!(camera = %self.role, error = %e, "unexpected cycle error");
                }
                CycleOutcome::Failed(FailureKind::from(&e))
            }
        }
    }

    fn measure(&mut self, gray: &Mat) -> Result<Displacement> {
        let mask = self.segmenter.segment(gray)?;
        let crop = self.roi.crop(gray, &self.previous, &mask)?;
        let tracked = self
            .tracker
            .track(&crop.current, &crop.previous, crop.window.origin())?;
        let (dx_mm, dy_mm) = self.scale.to_world(tracked.dx_px, tracked.dy_px);
        Ok(Displacement {
            rotation_deg: tracked.rotation_deg,
            dx_mm,
            dy_mm,
            matches: tracked.num_matches(),
        })
    }

    fn log_outcome(&self, cycle_id: u64, frame: u64, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Tracked(d) => debug!(
                camera = %self.role,
                cycle_id,
                frame,
                rotation = d.rotation_deg,
                dx = d.dx_mm,
                dy = d.dy_mm,
                matches = d.matches,
                "tracked"
            ),
            CycleOutcome::Skipped(reason) => {
                warn!(camera = %self.role, cycle_id, frame, ?reason, "cycle skipped")
            }
            CycleOutcome::Failed(kind) => {
                warn!(camera = %self.role, cycle_id, frame, ?kind, "cycle failed")
            }
        }
    }
}

/// Open a camera, run its worker and always leave an end-of-stream marker.
///
/// `open` runs on the calling thread so devices never cross threads. If it
/// fails, or the reference frame cannot be read, the worker stops at once
/// and the controller still sees the stream end.
pub fn run_camera<C, S, F>(
    role: CameraRole,
    open: F,
    config: &Config,
    publisher: SamplePublisher,
) -> WorkerReport
where
    C: CameraSource,
    S: Segmenter,
    F: FnOnce() -> Result<(C, S)>,
{
    let worker = open().and_then(|(camera, segmenter)| {
        CaptureWorker::init(role, camera, segmenter, config)
    });
    match worker {
        Ok(worker) => worker.run(publisher),
        Err(e) => {
            warn!(camera = %role, error = %e, "camera unavailable, worker stopped");
            if publisher
                .publish(DisplacementSample::EndOfStream { cycles: 0 })
                .is_err()
            {
                debug!(camera = %role, "controller gone before end of stream");
            }
            WorkerReport::empty(role)
        }
    }
}


#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::testing::*;
    use super::*;
    use crate::system::rendezvous::camera_link;
    use crate::tracking::tracker::testing::{textured, window};

    fn drain(rx: &crate::system::rendezvous::SampleSubscriber) -> Vec<DisplacementSample> {
        let mut samples = Vec::new();
        loop {
            rx.wait_ready();
            let sample = rx.take();
            rx.acknowledge();
            let done = matches!(sample, DisplacementSample::EndOfStream { .. });
            samples.push(sample);
            if done {
                return samples;
            }
        }
    }

    #[test]
    fn test_skip_cadence_processes_first_and_thirtieth_frame() {
        let config = Config::default();
        assert_eq!(config.capture.frame_skip, 30);
        let camera = ScriptedCamera::numbered(31);
        let released = camera.released.clone();
        let segmenter = FixedSegmenter::missing();
        let seen = segmenter.seen.clone();

        let (tx, rx) = camera_link(config.capture.channel_capacity);
        let worker = CaptureWorker::init(CameraRole::Top, camera, segmenter, &config).unwrap();
        let report = worker.run(tx);
        let samples = drain(&rx);

        assert_eq!(*seen.lock(), vec![0, 30]);
        assert_eq!(report.frames_read, 31);
        assert_eq!(report.cycles, 2);
        assert_eq!(
            samples,
            vec![
                DisplacementSample::Cycle {
                    cycle_id: 0,
                    outcome: CycleOutcome::Skipped(SkipReason::NoRegion),
                },
                DisplacementSample::Cycle {
                    cycle_id: 1,
                    outcome: CycleOutcome::Skipped(SkipReason::NoRegion),
                },
                DisplacementSample::EndOfStream { cycles: 2 },
            ]
        );
        assert!(*released.lock());
    }

    #[test]
    fn test_featureless_region_fails_without_stopping() {
        let mut config = Config::default();
        config.capture.frame_skip = 1;
        let camera = ScriptedCamera::numbered(3);
        let (tx, rx) = camera_link(4);
        let worker =
            CaptureWorker::init(CameraRole::Bottom, camera, FixedSegmenter::rect(5, 5, 30, 20), &config)
                .unwrap();
        let report = worker.run(tx);
        let samples = drain(&rx);

        assert_eq!(report.cycles, 3);
        assert_eq!(report.tracked, 0);
        assert_eq!(samples.len(), 4);
        for sample in &samples[..3] {
            assert!(matches!(
                sample,
                DisplacementSample::Cycle {
                    outcome: CycleOutcome::Failed(FailureKind::InsufficientMatches { .. }),
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_tracks_sliding_texture_in_millimetres() {
        let mut config = Config::default();
        config.capture.frame_skip = 1;
        let scene = textured(320, 240, 11);
        // The visible window slides left, so content moves +4 px per frame.
        let frames = (0..3).map(|k| window(&scene, 60 - 4 * k, 40, 220, 170)).collect();
        let camera = ScriptedCamera::new(frames);

        let (tx, rx) = camera_link(4);
        let worker =
            CaptureWorker::init(CameraRole::Top, camera, FixedSegmenter::rect(30, 25, 160, 120), &config)
                .unwrap();
        let report = worker.run(tx);
        let samples = drain(&rx);

        assert_eq!(report.cycles, 2);
        assert_eq!(report.tracked, 2);
        // Cycle 0 seeds the window and compares the frame with itself.
        let expected_dx = [0.0, 4.0 * 0.45];
        for (sample, dx) in samples[..2].iter().zip(expected_dx) {
            let DisplacementSample::Cycle {
                outcome: CycleOutcome::Tracked(d),
                ..
            } = sample
            else {
                panic!("expected a tracked cycle, got {sample:?}");
            };
            assert_relative_eq!(d.dx_mm, dx, epsilon = 0.3);
            assert_relative_eq!(d.dy_mm, 0.0, epsilon = 0.3);
            assert_relative_eq!(d.rotation_deg, 0.0, epsilon = 1.0);
        }
    }

    #[test]
    fn test_unreadable_reference_still_ends_stream() {
        let config = Config::default();
        let (tx, rx) = camera_link(3);
        let report = run_camera(
            CameraRole::Top,
            || Ok((ScriptedCamera::new(Vec::new()), FixedSegmenter::missing())),
            &config,
            tx,
        );
        assert_eq!(report.cycles, 0);
        assert_eq!(drain(&rx), vec![DisplacementSample::EndOfStream { cycles: 0 }]);
    }

    #[test]
    fn test_unavailable_camera_tolerates_missing_controller() {
        let config = Config::default();
        let (tx, rx) = camera_link(1);
        drop(rx);
        let report = run_camera(
            CameraRole::Bottom,
            || -> Result<(ScriptedCamera, FixedSegmenter)> {
                Err(ServoError::CaptureFault("no device".into()))
            },
            &config,
            tx,
        );
        assert_eq!(report, WorkerReport::empty(CameraRole::Bottom));
    }

    #[test]
    fn test_worker_stops_when_controller_hangs_up() {
        let mut config = Config::default();
        config.capture.frame_skip = 1;
        let camera = ScriptedCamera::numbered(10);
        let released = camera.released.clone();
        let (tx, rx) = camera_link(1);
        drop(rx);

        let worker =
            CaptureWorker::init(CameraRole::Top, camera, FixedSegmenter::missing(), &config).unwrap();
        let report = worker.run(tx);
        assert_eq!(report.cycles, 0);
        assert_eq!(report.frames_read, 1);
        assert!(*released.lock());
    }
}
