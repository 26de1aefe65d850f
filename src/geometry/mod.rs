//! Geometry utilities: robust homography fitting, pixel scale conversion.

pub mod homography;
pub mod scale;

pub use homography::{HomographyFit, MIN_CORRESPONDENCES, fit_homography, rotation_deg};
pub use scale::PixelScale;
