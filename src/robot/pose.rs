//! Arm pose and per-cycle pose deltas.

use std::ops::AddAssign;

use serde::Deserialize;

/// Commanded pose of the 5-axis arm: two wrist joints plus Cartesian tool
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct ArmPose {
    /// Joint 6 (wrist roll), degrees.
    pub j6_deg: f32,
    /// Joint 5 (wrist pitch), degrees.
    pub j5_deg: f32,
    pub x_mm: f32,
    pub y_mm: f32,
    pub z_mm: f32,
}

impl ArmPose {
    pub const fn new(j6_deg: f32, j5_deg: f32, x_mm: f32, y_mm: f32, z_mm: f32) -> Self {
        Self {
            j6_deg,
            j5_deg,
            x_mm,
            y_mm,
            z_mm,
        }
    }
}

/// Incremental move combining one top-camera and one bottom-camera sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseDelta {
    pub j6_deg: f32,
    pub j5_deg: f32,
    pub x_mm: f32,
    pub y_mm: f32,
    pub z_mm: f32,
}

impl PoseDelta {
    pub fn is_zero(&self) -> bool {
        self.j6_deg == 0.0
            && self.j5_deg == 0.0
            && self.x_mm == 0.0
            && self.y_mm == 0.0
            && self.z_mm == 0.0
    }
}

impl AddAssign<PoseDelta> for ArmPose {
    fn add_assign(&mut self, delta: PoseDelta) {
        self.j6_deg += delta.j6_deg;
        self.j5_deg += delta.j5_deg;
        self.x_mm += delta.x_mm;
        self.y_mm += delta.y_mm;
        self.z_mm += delta.z_mm;
    }
}
