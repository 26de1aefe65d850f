//! Scale-invariant keypoint extraction.

use opencv::core::{KeyPoint, Mat, Point2f, Ptr, Vector};
use opencv::features2d::{self, KeyPointsFilter};
use opencv::prelude::*;

use crate::error::Result;

/// Keypoints and their SIFT descriptors (one CV_32F row per keypoint).
pub struct FeatureSet {
    pub keypoints: Vector<KeyPoint>,
    pub descriptors: Mat,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Keypoint locations shifted from crop to source-frame coordinates.
    pub fn points_in_frame(&self, origin: Point2f) -> Vec<Point2f> {
        self.keypoints
            .iter()
            .map(|kp| {
                let pt = kp.pt();
                Point2f::new(pt.x + origin.x, pt.y + origin.y)
            })
            .collect()
    }
}

/// SIFT detector capped to the strongest `max_features` responses.
pub struct FeatureExtractor {
    sift: Ptr<features2d::SIFT>,
    max_features: i32,
}

impl FeatureExtractor {
    pub fn new(max_features: i32) -> Result<Self> {
        let sift = features2d::SIFT::create_def()?;
        Ok(Self { sift, max_features })
    }

    pub fn detect(&mut self, image: &Mat) -> Result<FeatureSet> {
        let mut keypoints = Vector::<KeyPoint>::new();
        let mask = Mat::default();
        self.sift.detect(image, &mut keypoints, &mask)?;
        KeyPointsFilter::retain_best(&mut keypoints, self.max_features)?;

        let mut descriptors = Mat::default();
        if !keypoints.is_empty() {
            self.sift.compute(image, &mut keypoints, &mut descriptors)?;
        }
        Ok(FeatureSet {
            keypoints,
            descriptors,
        })
    }
}
