//! Target segmentation: turn a grayscale frame into the set of pixels that
//! belong to the tracked region.
//!
//! The learned model itself lives outside this crate behind [`MaskModel`];
//! [`ModelSegmenter`] only prepares its input and thresholds its output.
//! [`OtsuSegmenter`] is a model-free fallback for bench setups.

use opencv::core::{self, CV_8U, CV_32F, Mat, Point, Size, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::SegmentationConfig;
use crate::error::{Result, ServoError};

/// Inclusive pixel extremes of a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

/// Pixel coordinates (x = column, y = row) matched by a segmenter.
#[derive(Debug, Clone, Default)]
pub struct RegionMask {
    points: Vec<Point>,
}

impl RegionMask {
    pub fn from_points(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.points.first()?;
        let init = BoundingBox {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        Some(self.points.iter().fold(init, |b, p| BoundingBox {
            min_x: b.min_x.min(p.x),
            max_x: b.max_x.max(p.x),
            min_y: b.min_y.min(p.y),
            max_y: b.max_y.max(p.y),
        }))
    }

    /// Non-zero pixels of a binary image.
    pub fn from_binary(binary: &Mat) -> Result<Self> {
        let mut points = Vector::<Point>::new();
        if core::count_non_zero(binary)? > 0 {
            core::find_non_zero(binary, &mut points)?;
        }
        Ok(Self::from_points(points.to_vec()))
    }
}

/// Locates the target region in a grayscale frame.
///
/// Returns `ServoError::SegmentationMiss` when nothing is found, so callers
/// can tell "no region" apart from a processing error.
pub trait Segmenter {
    fn segment(&mut self, gray: &Mat) -> Result<RegionMask>;
}

/// External per-pixel probability model.
pub trait MaskModel {
    /// `input` is a square CV_32FC1 image scaled to `[0, 1]`. Returns a
    /// single-channel CV_32F probability map of any size.
    fn predict(&mut self, input: &Mat) -> Result<Mat>;
}

/// Decreasing thresholds tried until some pixel passes.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdLadder {
    pub base: f64,
    pub floor: f64,
    pub step: f64,
}

impl ThresholdLadder {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            base: config.base_threshold,
            floor: config.min_threshold,
            step: config.threshold_step,
        }
    }

    /// `base, base - step, ...` down to and including the floor.
    pub fn thresholds(&self) -> impl Iterator<Item = f64> + '_ {
        // Compare with a little slack so 0.7 - 6 * 0.1 still reaches 0.1.
        (0u32..)
            .map(|k| self.base - k as f64 * self.step)
            .take_while(|t| *t >= self.floor - 1e-9)
    }

    /// First non-empty `probability > threshold` mask down the ladder.
    pub fn extract(&self, probabilities: &Mat) -> Result<RegionMask> {
        for threshold in self.thresholds() {
            let mut passed = Mat::default();
            imgproc::threshold(
                probabilities,
                &mut passed,
                threshold,
                255.0,
                imgproc::THRESH_BINARY,
            )?;
            let mut binary = Mat::default();
            passed.convert_to(&mut binary, CV_8U, 1.0, 0.0)?;

            let mask = RegionMask::from_binary(&binary)?;
            if !mask.is_empty() {
                tracing::trace!(threshold, pixels = mask.len(), "region found");
                return Ok(mask);
            }
        }
        Err(ServoError::SegmentationMiss)
    }
}

/// Wraps a probability model: resize, normalise, predict, resize back,
/// threshold down the ladder.
pub struct ModelSegmenter<M: MaskModel> {
    model: M,
    ladder: ThresholdLadder,
    input_side: i32,
}

impl<M: MaskModel> ModelSegmenter<M> {
    pub fn new(model: M, config: &SegmentationConfig) -> Self {
        Self {
            model,
            ladder: ThresholdLadder::from_config(config),
            input_side: config.model_input,
        }
    }
}

impl<M: MaskModel> Segmenter for ModelSegmenter<M> {
    fn segment(&mut self, gray: &Mat) -> Result<RegionMask> {
        let mut small = Mat::default();
        imgproc::resize(
            gray,
            &mut small,
            Size::new(self.input_side, self.input_side),
            0.0,
            0.0,
            imgproc::INTER_AREA,
        )?;
        let mut input = Mat::default();
        small.convert_to(&mut input, CV_32F, 1.0 / 255.0, 0.0)?;

        let prediction = self.model.predict(&input)?;
        if prediction.empty() {
            return Err(ServoError::SegmentationMiss);
        }

        let mut probabilities = Mat::default();
        imgproc::resize(
            &prediction,
            &mut probabilities,
            gray.size()?,
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        self.ladder.extract(&probabilities)
    }
}

/// Classical fallback: blur, Otsu threshold, morphological opening.
pub struct OtsuSegmenter {
    /// Treat dark pixels as the target instead of bright ones.
    pub invert: bool,
    /// Opening kernel side; removes specks smaller than this.
    pub open_kernel: i32,
}

impl Default for OtsuSegmenter {
    fn default() -> Self {
        Self {
            invert: true,
            open_kernel: 7,
        }
    }
}

impl Segmenter for OtsuSegmenter {
    fn segment(&mut self, gray: &Mat) -> Result<RegionMask> {
        let mut blurred = Mat::default();
        imgproc::gaussian_blur_def(gray, &mut blurred, Size::new(5, 5), 0.0)?;

        let mode = if self.invert {
            imgproc::THRESH_BINARY_INV
        } else {
            imgproc::THRESH_BINARY
        };
        let mut binary = Mat::default();
        imgproc::threshold(
            &blurred,
            &mut binary,
            0.0,
            255.0,
            mode | imgproc::THRESH_OTSU,
        )?;

        let kernel = imgproc::get_structuring_element_def(
            imgproc::MORPH_ELLIPSE,
            Size::new(self.open_kernel, self.open_kernel),
        )?;
        let mut opened = Mat::default();
        imgproc::morphology_ex_def(&binary, &mut opened, imgproc::MORPH_OPEN, &kernel)?;

        let total = (opened.rows() * opened.cols()) as usize;
        let mask = RegionMask::from_binary(&opened)?;
        // A uniform frame thresholds to nothing or to everything.
        if mask.is_empty() || mask.len() == total {
            return Err(ServoError::SegmentationMiss);
        }
        Ok(mask)
    }
}
