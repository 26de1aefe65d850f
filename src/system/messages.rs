//! Samples passed from the capture workers to the controller.

use std::fmt;

use crate::error::ServoError;

/// Which camera a worker drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraRole {
    /// Looks down at the target; drives j6, x and y.
    Top,
    /// Looks up at the target; drives j5 and z.
    Bottom,
}

impl fmt::Display for CameraRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => write!(f, "top"),
            Self::Bottom => write!(f, "bottom"),
        }
    }
}

/// Motion measured by one camera in one cycle, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    pub rotation_deg: f64,
    pub dx_mm: f64,
    pub dy_mm: f64,
    pub matches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The segmenter found no target in the frame.
    NoRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    InsufficientMatches { found: usize },
    DegenerateHomography,
    /// Any other image-processing error.
    Vision(String),
}

impl From<&ServoError> for FailureKind {
    fn from(err: &ServoError) -> Self {
        match err {
            ServoError::InsufficientMatches { found, .. } => {
                Self::InsufficientMatches { found: *found }
            }
            ServoError::DegenerateHomography => Self::DegenerateHomography,
            other => Self::Vision(other.to_string()),
        }
    }
}

/// What happened to one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Tracked(Displacement),
    Skipped(SkipReason),
    Failed(FailureKind),
}

impl CycleOutcome {
    pub fn displacement(&self) -> Option<&Displacement> {
        match self {
            Self::Tracked(d) => Some(d),
            _ => None,
        }
    }
}

/// One message on a camera link.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplacementSample {
    Cycle { cycle_id: u64, outcome: CycleOutcome },
    /// The camera stopped; `cycles` samples were published before this one.
    EndOfStream { cycles: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_from_tracking_errors() {
        let err = ServoError::InsufficientMatches {
            found: 2,
            required: 4,
        };
        assert_eq!(
            FailureKind::from(&err),
            FailureKind::InsufficientMatches { found: 2 }
        );
        assert_eq!(
            FailureKind::from(&ServoError::DegenerateHomography),
            FailureKind::DegenerateHomography
        );
        assert!(matches!(
            FailureKind::from(&ServoError::Protocol("x".into())),
            FailureKind::Vision(_)
        ));
    }

    #[test]
    fn test_only_tracked_outcomes_carry_displacement() {
        let d = Displacement {
            rotation_deg: 1.0,
            dx_mm: 2.0,
            dy_mm: 3.0,
            matches: 12,
        };
        assert_eq!(CycleOutcome::Tracked(d).displacement(), Some(&d));
        assert!(CycleOutcome::Skipped(SkipReason::NoRegion)
            .displacement()
            .is_none());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(CameraRole::Top.to_string(), "top");
        assert_eq!(CameraRole::Bottom.to_string(), "bottom");
    }
}
