//! Robust planar homography fit and in-plane rotation extraction.

use nalgebra::Matrix3;
use opencv::calib3d;
use opencv::core::{self, Mat, Point2f, Vector};
use opencv::prelude::*;

use crate::error::{Result, ServoError};

/// Minimum correspondences for a homography (8 DOF, 2 equations each).
pub const MIN_CORRESPONDENCES: usize = 4;

/// Result of a RANSAC homography fit.
pub struct HomographyFit {
    /// Maps source points onto destination points.
    pub matrix: Matrix3<f64>,
    pub num_inliers: usize,
}

impl HomographyFit {
    /// In-plane rotation of the fitted transform, in degrees.
    pub fn rotation_deg(&self) -> Result<f64> {
        rotation_deg(&self.matrix).ok_or(ServoError::DegenerateHomography)
    }
}

/// Fit `dst ~ H * src` with RANSAC.
///
/// # Arguments
/// * `src` - Source points (previous frame)
/// * `dst` - Destination points, `dst[i]` corresponds to `src[i]`
/// * `reproj_threshold` - Max reprojection error (px) for a RANSAC inlier
pub fn fit_homography(
    src: &[Point2f],
    dst: &[Point2f],
    reproj_threshold: f64,
) -> Result<HomographyFit> {
    let n = src.len().min(dst.len());
    if n < MIN_CORRESPONDENCES {
        return Err(ServoError::InsufficientMatches {
            found: n,
            required: MIN_CORRESPONDENCES,
        });
    }

    let src_pts: Vector<Point2f> = src[..n].iter().copied().collect();
    let dst_pts: Vector<Point2f> = dst[..n].iter().copied().collect();
    let mut inlier_mask = Mat::default();
    let h = calib3d::find_homography(
        &src_pts,
        &dst_pts,
        &mut inlier_mask,
        calib3d::RANSAC,
        reproj_threshold,
    )?;
    if h.empty() {
        return Err(ServoError::DegenerateHomography);
    }

    let matrix = homography_matrix(&h)?;
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(ServoError::DegenerateHomography);
    }
    let num_inliers = if inlier_mask.empty() {
        0
    } else {
        core::count_non_zero(&inlier_mask)? as usize
    };

    Ok(HomographyFit {
        matrix,
        num_inliers,
    })
}

/// Rotation angle of the linear part: `atan2(h10, h00)` in degrees.
///
/// Returns `None` when the linear part has collapsed and the angle is
/// undefined.
pub fn rotation_deg(h: &Matrix3<f64>) -> Option<f64> {
    let (cos_part, sin_part) = (h[(0, 0)], h[(1, 0)]);
    if !cos_part.is_finite() || !sin_part.is_finite() {
        return None;
    }
    if cos_part == 0.0 && sin_part == 0.0 {
        return None;
    }
    Some(sin_part.atan2(cos_part).to_degrees())
}

/// Read the 3x3 CV_64F homography OpenCV returns into a `Matrix3`.
fn homography_matrix(h: &Mat) -> Result<Matrix3<f64>> {
    if h.rows() != 3 || h.cols() != 3 {
        return Err(ServoError::DegenerateHomography);
    }
    let mut matrix = Matrix3::zeros();
    for row in 0..3 {
        for col in 0..3 {
            matrix[(row, col)] = *h.at_2d::<f64>(row as i32, col as i32)?;
        }
    }
    Ok(matrix)
}
