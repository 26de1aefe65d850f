//! Output of one tracking cycle.

use opencv::core::Point2f;

/// Correspondences and motion estimated for one cycle.
///
/// All points are in source-frame pixels.
pub struct TrackOutput {
    pub source_points: Vec<Point2f>,
    pub destination_points: Vec<Point2f>,
    pub dx_px: f64,
    pub dy_px: f64,
    pub rotation_deg: f64,
    pub num_inliers: usize,
}

impl TrackOutput {
    pub fn num_matches(&self) -> usize {
        self.source_points.len()
    }
}
