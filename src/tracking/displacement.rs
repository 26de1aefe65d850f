//! Robust planar displacement from point correspondences.

use opencv::core::Point2f;

/// Median of a sample; the mean of the two middle values for even counts.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Per-axis median of `dst - src`.
///
/// The median ignores the minority of correspondences that survive the
/// ratio test but still point at the wrong feature.
pub fn median_displacement(src: &[Point2f], dst: &[Point2f]) -> Option<(f64, f64)> {
    let (mut dx, mut dy): (Vec<f64>, Vec<f64>) = src
        .iter()
        .zip(dst)
        .map(|(s, d)| ((d.x - s.x) as f64, (d.y - s.y) as f64))
        .unzip();
    Some((median(&mut dx)?, median(&mut dy)?))
}
