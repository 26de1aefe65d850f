//! Frame-to-frame descriptor matching with Lowe's ratio test.

use opencv::core::{DMatch, Mat, Ptr, Vector};
use opencv::features2d::FlannBasedMatcher;
use opencv::flann::{IndexParams, KDTreeIndexParams, SearchParams};
use opencv::prelude::*;

use crate::error::Result;

/// Approximate nearest-neighbour matcher over a randomized KD-tree forest.
pub struct RatioMatcher {
    matcher: FlannBasedMatcher,
    ratio: f32,
}

impl RatioMatcher {
    /// # Arguments
    /// * `ratio` - Lowe ratio for the best/second-best test
    /// * `trees` - KD-trees in the FLANN index
    /// * `checks` - Leaves visited per query; lower is faster and less exact
    pub fn new(ratio: f32, trees: i32, checks: i32) -> Result<Self> {
        let index: Ptr<IndexParams> = Ptr::new(KDTreeIndexParams::new(trees)?).into();
        let search = Ptr::new(SearchParams::new_1(checks, 0.0, true)?);
        let matcher = FlannBasedMatcher::new(&index, &search)?;
        Ok(Self { matcher, ratio })
    }

    /// Matches from `prev` (query) into `curr` (train) that pass the ratio
    /// test. `query_idx` indexes `prev` rows, `train_idx` indexes `curr` rows.
    pub fn match_features(&self, prev: &Mat, curr: &Mat) -> Result<Vec<DMatch>> {
        let mut knn = Vector::<Vector<DMatch>>::new();
        self.matcher
            .knn_train_match(prev, curr, &mut knn, 2, &Mat::default(), false)?;
        Ok(ratio_filter(&knn, self.ratio))
    }
}

/// Keep the best candidate of each query when it clearly beats the runner-up.
///
/// Queries with fewer than two candidates are dropped: without a runner-up
/// there is nothing to disambiguate against.
pub fn ratio_filter(knn: &Vector<Vector<DMatch>>, ratio: f32) -> Vec<DMatch> {
    knn.iter()
        .filter_map(|candidates| {
            if candidates.len() < 2 {
                return None;
            }
            let best = candidates.get(0).ok()?;
            let second = candidates.get(1).ok()?;
            (best.distance < ratio * second.distance).then_some(best)
        })
        .collect()
}
