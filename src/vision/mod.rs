//! Per-camera image front end: frame sources, segmentation and ROI cropping.

pub mod camera;
pub mod roi;
pub mod segmentation;

pub use camera::{CameraSource, VideoCaptureSource, to_gray};
pub use roi::{RoiCrop, RoiManager, RoiWindow};
pub use segmentation::{
    BoundingBox, MaskModel, ModelSegmenter, OtsuSegmenter, RegionMask, Segmenter,
    ThresholdLadder,
};
