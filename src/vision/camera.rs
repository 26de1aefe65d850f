//! Frame sources.

use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use tracing::{info, warn};

use crate::error::{Result, ServoError};

/// Sequential frame producer. A read error means end-of-stream; no frames
/// follow it.
pub trait CameraSource {
    fn read_frame(&mut self) -> Result<Mat>;

    /// Give the device back. Called once when the worker stops.
    fn release(&mut self) {}
}

/// OpenCV capture device at a fixed resolution.
pub struct VideoCaptureSource {
    capture: VideoCapture,
    camera_id: i32,
}

impl VideoCaptureSource {
    pub fn open(camera_id: i32, width: i32, height: i32) -> Result<Self> {
        let mut capture = VideoCapture::new(camera_id, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(ServoError::CaptureFault(format!(
                "camera {camera_id} did not open"
            )));
        }
        // Keep the driver from queueing stale frames behind the skip cadence.
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        info!(camera_id, width, height, "camera open");
        Ok(Self { capture, camera_id })
    }
}

impl CameraSource for VideoCaptureSource {
    fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        let grabbed = self.capture.read(&mut frame)?;
        if !grabbed || frame.empty() {
            return Err(ServoError::CaptureFault(format!(
                "camera {} returned no frame",
                self.camera_id
            )));
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!(camera_id = self.camera_id, error = %e, "camera release failed");
        }
    }
}

/// Single-channel 8-bit copy of a capture, whatever its channel layout.
pub fn to_gray(frame: &Mat) -> Result<Mat> {
    let code = match frame.channels() {
        1 => return Ok(frame.try_clone()?),
        3 => imgproc::COLOR_BGR2GRAY,
        4 => imgproc::COLOR_BGRA2GRAY,
        n => {
            return Err(ServoError::CaptureFault(format!(
                "unsupported frame with {n} channels"
            )));
        }
    };
    let mut gray = Mat::default();
    imgproc::cvt_color_def(frame, &mut gray, code)?;
    Ok(gray)
}
