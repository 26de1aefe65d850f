use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use rust_visual_servo::config::Config;
use rust_visual_servo::robot::{LogTransport, RobotLink, SerialTransport, Transport};
use rust_visual_servo::system::ServoSystem;
use rust_visual_servo::vision::{OtsuSegmenter, VideoCaptureSource};

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/servo.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        config = %config_path.display(),
        top = config.cameras.top_id,
        bottom = config.cameras.bottom_id,
        skip = config.capture.frame_skip,
        dry_run = config.robot.dry_run,
        "starting visual servo"
    );

    let transport: Box<dyn Transport> = if config.robot.dry_run {
        Box::new(LogTransport::default())
    } else {
        Box::new(
            SerialTransport::open(&config.robot.port, config.robot.baud_rate)
                .with_context(|| format!("failed to open serial port {}", config.robot.port))?,
        )
    };
    let link = RobotLink::new(transport, &config.robot);

    let config = Arc::new(config);
    let (top_id, bottom_id) = (config.cameras.top_id, config.cameras.bottom_id);
    let (width, height) = (config.cameras.frame_width, config.cameras.frame_height);
    let system = ServoSystem::start(
        config,
        link,
        move || {
            let camera = VideoCaptureSource::open(top_id, width, height)?;
            Ok((camera, OtsuSegmenter::default()))
        },
        move || {
            let camera = VideoCaptureSource::open(bottom_id, width, height)?;
            Ok((camera, OtsuSegmenter::default()))
        },
    )?;

    let report = system.join()?;
    info!(
        top_cycles = report.top.cycles,
        bottom_cycles = report.bottom.cycles,
        moves = report.control.moves,
        "done"
    );
    Ok(())
}
