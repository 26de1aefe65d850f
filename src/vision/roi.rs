//! Region-of-interest window tracking and frame-pair cropping.

use opencv::core::{self, Mat, Point2f, Rect};
use opencv::imgproc;
use opencv::prelude::*;
use tracing::debug;

use crate::config::RoiConfig;
use crate::error::{Result, ServoError};
use crate::vision::segmentation::{BoundingBox, RegionMask};

/// Crop window in source-frame pixels. `max_*` bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiWindow {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl RoiWindow {
    /// Window covering every pixel of an inclusive bounding box.
    pub fn from_box(b: &BoundingBox) -> Self {
        Self {
            min_x: b.min_x,
            max_x: b.max_x + 1,
            min_y: b.min_y,
            max_y: b.max_y + 1,
        }
    }

    pub fn union(&self, other: &RoiWindow) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn expand(&self, border: i32) -> Self {
        Self {
            min_x: self.min_x.saturating_sub(border),
            max_x: self.max_x.saturating_add(border),
            min_y: self.min_y.saturating_sub(border),
            max_y: self.max_y.saturating_add(border),
        }
    }

    /// Clamp into `[0, width] x [0, height]` keeping `min <= max`.
    pub fn clamp_to(&self, width: i32, height: i32) -> Self {
        let min_x = self.min_x.clamp(0, width);
        let min_y = self.min_y.clamp(0, height);
        Self {
            min_x,
            max_x: self.max_x.clamp(min_x, width),
            min_y,
            max_y: self.max_y.clamp(min_y, height),
        }
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Top-left corner; adding it maps crop coordinates back to the frame.
    pub fn origin(&self) -> Point2f {
        Point2f::new(self.min_x as f32, self.min_y as f32)
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.min_x, self.min_y, self.width(), self.height())
    }
}

/// Denoised crops of the current and previous frames.
pub struct RoiCrop {
    pub current: Mat,
    pub previous: Mat,
    /// Bordered, clamped window the current crop was cut from.
    pub window: RoiWindow,
}

/// Keeps the detection window for one camera.
///
/// The window is the union of every detection since the last reset, so it
/// only grows. Jitter in the segmentation therefore never moves the crop
/// origin inward, at the cost of the crop widening over a long run.
pub struct RoiManager {
    config: RoiConfig,
    window: Option<RoiWindow>,
    consecutive_misses: u32,
}

impl RoiManager {
    pub fn new(config: &RoiConfig) -> Self {
        Self {
            config: config.clone(),
            window: None,
            consecutive_misses: 0,
        }
    }

    /// Accumulated detection window, before border and clamping.
    pub fn window(&self) -> Option<RoiWindow> {
        self.window
    }

    /// Fold a new detection into the window and crop both frames to it.
    ///
    /// When the window is being seeded (first detection, or the first one
    /// after a reset) the previous crop is a copy of the current one, so
    /// that cycle measures no motion.
    pub fn crop(&mut self, current: &Mat, previous: &Mat, mask: &RegionMask) -> Result<RoiCrop> {
        let detection = mask
            .bounding_box()
            .map(|b| RoiWindow::from_box(&b))
            .ok_or(ServoError::SegmentationMiss)?;
        let seeding = self.window.is_none();
        let grown = match self.window {
            Some(prev) => prev.union(&detection),
            None => detection,
        };
        self.window = Some(grown);
        self.consecutive_misses = 0;

        let bordered = grown.expand(self.config.border);
        let window = bordered.clamp_to(current.cols(), current.rows());
        if window.is_empty() {
            return Err(ServoError::SegmentationMiss);
        }
        let current_crop = self.denoise(&crop(current, &window)?)?;

        // The retained frame may be a different size; clamp separately.
        let prev_window = bordered.clamp_to(previous.cols(), previous.rows());
        let previous_crop = if seeding {
            current_crop.try_clone()?
        } else if prev_window.is_empty() {
            debug!(?prev_window, "previous frame outside window, reusing current crop");
            current_crop.try_clone()?
        } else {
            self.denoise(&crop(previous, &prev_window)?)?
        };

        Ok(RoiCrop {
            current: current_crop,
            previous: previous_crop,
            window,
        })
    }

    /// Note a frame without detection. Returns true when this miss
    /// discarded the window.
    pub fn record_miss(&mut self) -> bool {
        self.consecutive_misses += 1;
        let limit = self.config.reset_after_misses;
        if limit > 0 && self.consecutive_misses >= limit && self.window.is_some() {
            self.reset();
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.window = None;
        self.consecutive_misses = 0;
    }

    fn denoise(&self, image: &Mat) -> Result<Mat> {
        let mut smoothed = Mat::default();
        imgproc::bilateral_filter(
            image,
            &mut smoothed,
            self.config.bilateral_diameter,
            self.config.sigma_color,
            self.config.sigma_space,
            core::BORDER_DEFAULT,
        )?;
        Ok(smoothed)
    }
}

fn crop(image: &Mat, window: &RoiWindow) -> Result<Mat> {
    Ok(Mat::roi(image, window.rect())?.try_clone()?)
}
