//! Per-camera feature tracking: SIFT extraction, ratio-tested FLANN
//! matching, median displacement and homography rotation.

pub mod displacement;
pub mod features;
pub mod matching;
pub mod result;
pub mod state;
pub mod tracker;

pub use displacement::{median, median_displacement};
pub use features::{FeatureExtractor, FeatureSet};
pub use matching::RatioMatcher;
pub use result::TrackOutput;
pub use state::{FeatureSnapshot, TrackState};
pub use tracker::Tracker;
