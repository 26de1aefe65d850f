//! Error taxonomy shared by the vision, tracking and robot layers.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServoError {
    /// Camera could not be opened or stopped producing frames.
    #[error("camera unreadable: {0}")]
    CaptureFault(String),

    /// The segmenter found no region, even at the lowest threshold.
    #[error("no target region found in frame")]
    SegmentationMiss,

    /// Too few ratio-test survivors to fit a homography.
    #[error("only {found} feature matches, need at least {required}")]
    InsufficientMatches { found: usize, required: usize },

    /// RANSAC returned no usable transform.
    #[error("homography fit is degenerate")]
    DegenerateHomography,

    /// Writing to the robot link failed. Fatal for the control loop.
    #[error("robot transport failed: {0}")]
    TransportFault(#[source] io::Error),

    #[error("cycle mismatch: top camera at {top}, bottom camera at {bottom}")]
    CycleMismatch { top: u64, bottom: u64 },

    #[error("malformed instruction frame: {0}")]
    Protocol(String),

    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

impl ServoError {
    /// Per-cycle vision errors that the capture worker absorbs into a
    /// cycle outcome instead of stopping.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SegmentationMiss
                | Self::InsufficientMatches { .. }
                | Self::DegenerateHomography
                | Self::OpenCv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ServoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(ServoError::SegmentationMiss.is_recoverable());
        assert!(
            ServoError::InsufficientMatches {
                found: 2,
                required: 4
            }
            .is_recoverable()
        );
        assert!(!ServoError::CaptureFault("gone".into()).is_recoverable());
        assert!(
            !ServoError::TransportFault(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
                .is_recoverable()
        );
    }

    #[test]
    fn test_messages_name_the_counts() {
        let err = ServoError::InsufficientMatches {
            found: 3,
            required: 4,
        };
        assert_eq!(err.to_string(), "only 3 feature matches, need at least 4");
    }
}
