//! Per-camera tracking chain state.

use opencv::core::{Mat, Point2f};

/// Features of the last successfully tracked frame.
pub struct FeatureSnapshot {
    /// Keypoint locations in source-frame pixels, indexed like
    /// `descriptors` rows. These are the next cycle's source points.
    pub keypoints: Vec<Point2f>,
    pub descriptors: Mat,
}

/// State of the tracking chain.
#[derive(Default)]
pub enum TrackState {
    /// No reference features yet; the next cycle seeds from the previous crop.
    #[default]
    Unseeded,
    /// Chained: the next cycle matches against these features.
    Steady(FeatureSnapshot),
}

impl TrackState {
    pub fn is_seeded(&self) -> bool {
        matches!(self, Self::Steady(_))
    }
}
