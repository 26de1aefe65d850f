//! Incremental feature tracker for one camera.
//!
//! Tracking is chained: each cycle matches the current crop against the
//! features of the last successful cycle rather than re-detecting on the
//! previous crop, so repeated re-segmentation does not reset the reference
//! and introduce drift.

use opencv::core::{Mat, Point2f};
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::error::{Result, ServoError};
use crate::geometry::fit_homography;
use crate::tracking::displacement::median_displacement;
use crate::tracking::features::FeatureExtractor;
use crate::tracking::matching::RatioMatcher;
use crate::tracking::result::TrackOutput;
use crate::tracking::state::{FeatureSnapshot, TrackState};

pub struct Tracker {
    extractor: FeatureExtractor,
    matcher: RatioMatcher,
    state: TrackState,
    min_matches: usize,
    ransac_reproj_threshold: f64,
    reseed_after_failures: u32,
    consecutive_failures: u32,
}

impl Tracker {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        Ok(Self {
            extractor: FeatureExtractor::new(config.max_features)?,
            matcher: RatioMatcher::new(
                config.match_ratio,
                config.flann_trees,
                config.flann_checks,
            )?,
            state: TrackState::Unseeded,
            min_matches: config.min_matches,
            ransac_reproj_threshold: config.ransac_reproj_threshold,
            reseed_after_failures: config.reseed_after_failures,
            consecutive_failures: 0,
        })
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    /// Drop the chain; the next cycle seeds from its previous crop.
    pub fn reset(&mut self) {
        self.state = TrackState::Unseeded;
        self.consecutive_failures = 0;
    }

    /// Estimate motion between the previous and current crops.
    ///
    /// # Arguments
    /// * `current` - Denoised crop of the current frame
    /// * `previous` - Denoised crop of the previous frame; only read while unseeded
    /// * `origin` - Frame position of the crops' top-left corner
    ///
    /// On failure the chain keeps its last good features, so the next cycle
    /// measures motion since the last success. Repeated failures re-seed.
    pub fn track(&mut self, current: &Mat, previous: &Mat, origin: Point2f) -> Result<TrackOutput> {
        match self.estimate(current, previous, origin) {
            Ok((output, snapshot)) => {
                self.state = TrackState::Steady(snapshot);
                self.consecutive_failures = 0;
                Ok(output)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.reseed_after_failures > 0
                    && self.consecutive_failures >= self.reseed_after_failures
                    && self.state.is_seeded()
                {
                    warn!(
                        failures = self.consecutive_failures,
                        "tracking chain lost, re-seeding"
                    );
                    self.reset();
                }
                Err(e)
            }
        }
    }

    fn estimate(
        &mut self,
        current: &Mat,
        previous: &Mat,
        origin: Point2f,
    ) -> Result<(TrackOutput, FeatureSnapshot)> {
        let seeded;
        let (prev_points, prev_descriptors) = match &self.state {
            TrackState::Steady(snapshot) => (snapshot.keypoints.as_slice(), &snapshot.descriptors),
            TrackState::Unseeded => {
                let features = self.extractor.detect(previous)?;
                seeded = (features.points_in_frame(origin), features.descriptors);
                (seeded.0.as_slice(), &seeded.1)
            }
        };

        let current_features = self.extractor.detect(current)?;
        let current_points = current_features.points_in_frame(origin);

        // FLANN cannot build an index over an empty set.
        let available = prev_points.len().min(current_points.len());
        if available < self.min_matches {
            return Err(ServoError::InsufficientMatches {
                found: available,
                required: self.min_matches,
            });
        }

        let matches = self
            .matcher
            .match_features(prev_descriptors, &current_features.descriptors)?;
        let (source_points, destination_points): (Vec<Point2f>, Vec<Point2f>) = matches
            .iter()
            .filter_map(|m| {
                let src = prev_points.get(m.query_idx as usize)?;
                let dst = current_points.get(m.train_idx as usize)?;
                Some((*src, *dst))
            })
            .unzip();
        if source_points.len() < self.min_matches {
            return Err(ServoError::InsufficientMatches {
                found: source_points.len(),
                required: self.min_matches,
            });
        }

        let (dx_px, dy_px) = median_displacement(&source_points, &destination_points)
            .ok_or(ServoError::DegenerateHomography)?;
        let fit = fit_homography(
            &source_points,
            &destination_points,
            self.ransac_reproj_threshold,
        )?;
        let rotation_deg = fit.rotation_deg()?;

        debug!(
            matches = source_points.len(),
            inliers = fit.num_inliers,
            dx_px,
            dy_px,
            rotation_deg,
            "tracked"
        );

        let snapshot = FeatureSnapshot {
            keypoints: current_points,
            descriptors: current_features.descriptors,
        };
        let output = TrackOutput {
            source_points,
            destination_points,
            dx_px,
            dy_px,
            rotation_deg,
            num_inliers: fit.num_inliers,
        };
        Ok((output, snapshot))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use opencv::core::{CV_8UC1, Mat, Rect, Scalar, Size};
    use opencv::imgproc;
    use opencv::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Deterministic blocky texture with plenty of corners for SIFT.
    pub fn textured(width: i32, height: i32, seed: u64) -> Mat {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut img =
            Mat::new_rows_cols_with_default(height, width, CV_8UC1, Scalar::all(128.0)).unwrap();
        for _ in 0..(width * height / 150) {
            let w = rng.gen_range(4..18);
            let h = rng.gen_range(4..18);
            let x = rng.gen_range(0..width - w);
            let y = rng.gen_range(0..height - h);
            let shade = rng.gen_range(0..=255) as f64;
            imgproc::rectangle(
                &mut img,
                Rect::new(x, y, w, h),
                Scalar::all(shade),
                imgproc::FILLED,
                imgproc::LINE_8,
                0,
            )
            .unwrap();
        }
        let mut smooth = Mat::default();
        imgproc::gaussian_blur_def(&img, &mut smooth, Size::new(3, 3), 0.0).unwrap();
        smooth
    }

    /// `width x height` window of `image` starting at `(x, y)`.
    pub fn window(image: &Mat, x: i32, y: i32, width: i32, height: i32) -> Mat {
        Mat::roi(image, Rect::new(x, y, width, height))
            .unwrap()
            .try_clone()
            .unwrap()
    }
}
