//! Immutable runtime configuration, loaded once from TOML at startup.
//!
//! Every section falls back to the values the rig was tuned with, so an
//! empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::robot::ArmPose;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cameras: CameraConfig,
    pub capture: CaptureConfig,
    pub segmentation: SegmentationConfig,
    pub roi: RoiConfig,
    pub tracker: TrackerConfig,
    pub conversion: ConversionConfig,
    pub robot: RobotConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub top_id: i32,
    pub bottom_id: i32,
    pub frame_width: i32,
    pub frame_height: i32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            top_id: 0,
            bottom_id: 2,
            frame_width: 1280,
            frame_height: 720,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Process every Nth frame.
    pub frame_skip: u64,
    /// Samples a worker may queue ahead of the controller before blocking.
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_skip: 30,
            channel_capacity: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Square side of the model input, in pixels.
    pub model_input: i32,
    pub base_threshold: f64,
    pub min_threshold: f64,
    pub threshold_step: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model_input: 128,
            base_threshold: 0.7,
            min_threshold: 0.1,
            threshold_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    pub border: i32,
    pub bilateral_diameter: i32,
    pub sigma_color: f64,
    pub sigma_space: f64,
    /// Consecutive segmentation misses before the window is discarded.
    /// Zero keeps the window forever.
    pub reset_after_misses: u32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            border: 5,
            bilateral_diameter: 10,
            sigma_color: 75.0,
            sigma_space: 750.0,
            reset_after_misses: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_features: i32,
    /// Lowe ratio: best match must be below `match_ratio * second_best`.
    pub match_ratio: f32,
    pub ransac_reproj_threshold: f64,
    pub min_matches: usize,
    /// Consecutive tracking failures before the chain is re-seeded.
    pub reseed_after_failures: u32,
    /// Randomized KD-trees in the FLANN index.
    pub flann_trees: i32,
    /// Leaves FLANN visits per query.
    pub flann_checks: i32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_features: 100,
            match_ratio: 0.8,
            ransac_reproj_threshold: 3.0,
            min_matches: 4,
            reseed_after_failures: 3,
            flann_trees: 4,
            flann_checks: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Calibration at the working distance; does not follow Z.
    pub scale_mm_per_px: f64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            scale_mm_per_px: 0.45,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Log frames instead of opening the serial port.
    pub dry_run: bool,
    pub home: ArmPose,
    /// mm/min
    pub home_speed: f32,
    /// mm/min
    pub cruise_speed: f32,
    pub home_settle_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
            dry_run: false,
            home: ArmPose::new(0.0, 0.0, 203.0, 163.0, 30.0),
            home_speed: 1000.0,
            cruise_speed: 2500.0,
            home_settle_ms: 3000,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl RobotConfig {
    pub fn home_settle(&self) -> Duration {
        Duration::from_millis(self.home_settle_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cams = &self.cameras;
        if cams.frame_width <= 0 || cams.frame_height <= 0 {
            return Err(ConfigError::Invalid(format!(
                "frame size {}x{} must be positive",
                cams.frame_width, cams.frame_height
            )));
        }
        if self.capture.frame_skip == 0 {
            return Err(ConfigError::Invalid("capture.frame_skip must be >= 1".into()));
        }
        if self.capture.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "capture.channel_capacity must be >= 1".into(),
            ));
        }

        let seg = &self.segmentation;
        if seg.model_input <= 0 {
            return Err(ConfigError::Invalid(
                "segmentation.model_input must be positive".into(),
            ));
        }
        if seg.threshold_step <= 0.0 || seg.min_threshold > seg.base_threshold {
            return Err(ConfigError::Invalid(format!(
                "threshold ladder {} -> {} step {} never terminates",
                seg.base_threshold, seg.min_threshold, seg.threshold_step
            )));
        }

        if self.roi.border < 0 {
            return Err(ConfigError::Invalid("roi.border must be >= 0".into()));
        }

        let tracker = &self.tracker;
        if !(tracker.match_ratio > 0.0 && tracker.match_ratio < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "tracker.match_ratio {} must lie in (0, 1)",
                tracker.match_ratio
            )));
        }
        if tracker.min_matches < 4 {
            return Err(ConfigError::Invalid(
                "tracker.min_matches below 4 cannot fit a homography".into(),
            ));
        }
        if tracker.max_features <= 0 || tracker.ransac_reproj_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "tracker.max_features and tracker.ransac_reproj_threshold must be positive".into(),
            ));
        }
        if tracker.flann_trees <= 0 || tracker.flann_checks <= 0 {
            return Err(ConfigError::Invalid(format!(
                "tracker.flann_trees {} and tracker.flann_checks {} must be positive",
                tracker.flann_trees, tracker.flann_checks
            )));
        }

        if self.conversion.scale_mm_per_px <= 0.0 {
            return Err(ConfigError::Invalid(
                "conversion.scale_mm_per_px must be positive".into(),
            ));
        }
        if self.robot.home_speed <= 0.0 || self.robot.cruise_speed <= 0.0 {
            return Err(ConfigError::Invalid("robot speeds must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_rig_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.capture.frame_skip, 30);
        assert_eq!(config.capture.channel_capacity, 3);
        assert_eq!(config.cameras.frame_width, 1280);
        assert_eq!(config.robot.baud_rate, 115_200);
        assert_eq!(config.robot.home.x_mm, 203.0);
        assert_eq!(config.robot.cruise_speed, 2500.0);
        assert_eq!(config.tracker.match_ratio, 0.8);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = Config::from_toml(include_str!("../config/servo.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.robot.home, defaults.robot.home);
        assert_eq!(config.robot.port, defaults.robot.port);
        assert_eq!(config.capture.frame_skip, defaults.capture.frame_skip);
        assert_eq!(config.roi.reset_after_misses, defaults.roi.reset_after_misses);
        assert_eq!(config.tracker.min_matches, defaults.tracker.min_matches);
        assert_eq!(config.tracker.flann_trees, 4);
        assert_eq!(config.tracker.flann_checks, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections_override() {
        let config = Config::from_toml(
            r#"
            [capture]
            frame_skip = 5

            [robot]
            port = "COM3"
            home = { j6_deg = 10.0, j5_deg = 0.0, x_mm = 1.0, y_mm = 2.0, z_mm = 3.0 }
            "#,
        )
        .unwrap();
        assert_eq!(config.capture.frame_skip, 5);
        assert_eq!(config.capture.channel_capacity, 3);
        assert_eq!(config.robot.port, "COM3");
        assert_eq!(config.robot.home.j6_deg, 10.0);
        assert_eq!(config.robot.home_speed, 1000.0);
    }

    #[test]
    fn test_rejects_zero_skip() {
        let err = Config::from_toml("[capture]\nframe_skip = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_ratio_outside_unit_interval() {
        assert!(Config::from_toml("[tracker]\nmatch_ratio = 1.5\n").is_err());
        assert!(Config::from_toml("[tracker]\nmatch_ratio = 0.0\n").is_err());
    }

    #[test]
    fn test_rejects_too_few_min_matches() {
        assert!(Config::from_toml("[tracker]\nmin_matches = 3\n").is_err());
    }

    #[test]
    fn test_rejects_empty_flann_index() {
        assert!(Config::from_toml("[tracker]\nflann_trees = 0\n").is_err());
        assert!(Config::from_toml("[tracker]\nflann_checks = -1\n").is_err());
    }

    #[test]
    fn test_rejects_inverted_threshold_ladder() {
        let err = Config::from_toml(
            "[segmentation]\nbase_threshold = 0.1\nmin_threshold = 0.5\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = Config::from_toml("[capture\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
