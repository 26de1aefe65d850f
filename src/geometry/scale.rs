//! Pixel to millimetre conversion.

/// Fixed image-plane scale at the calibrated working distance.
///
/// Approximate: the factor is not updated when the arm changes Z, so
/// displacements drift in scale as the target moves toward or away from the
/// camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelScale {
    pub mm_per_px: f64,
}

impl PixelScale {
    pub fn new(mm_per_px: f64) -> Self {
        Self { mm_per_px }
    }

    pub fn to_mm(&self, px: f64) -> f64 {
        px * self.mm_per_px
    }

    /// Convert an image-plane displacement to world millimetres.
    pub fn to_world(&self, dx_px: f64, dy_px: f64) -> (f64, f64) {
        (self.to_mm(dx_px), self.to_mm(dy_px))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scales_both_axes() {
        let scale = PixelScale::new(0.45);
        let (x, y) = scale.to_world(10.0, -4.0);
        assert_relative_eq!(x, 4.5, epsilon = 1e-12);
        assert_relative_eq!(y, -1.8, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_displacement_stays_zero() {
        assert_eq!(PixelScale::new(0.45).to_world(0.0, 0.0), (0.0, 0.0));
    }
}
