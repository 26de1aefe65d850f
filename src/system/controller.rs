//! Controller: pairs the two cameras' samples cycle by cycle and moves the
//! arm by their combined displacement.

use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::RobotConfig;
use crate::error::{Result, ServoError};
use crate::robot::{ArmPose, PoseDelta, RobotLink};

use super::messages::{CycleOutcome, DisplacementSample};
use super::rendezvous::SampleSubscriber;

/// Summary of a finished control session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlReport {
    /// Paired cycles handled before end-of-stream.
    pub cycles: u64,
    /// Move frames sent.
    pub moves: u64,
    pub final_pose: ArmPose,
}

#[derive(Default)]
struct LoopStats {
    cycles: u64,
    moves: u64,
}

pub struct Controller {
    link: RobotLink,
    shutdown_grace: Duration,
}

impl Controller {
    pub fn new(link: RobotLink, robot: &RobotConfig) -> Self {
        Self {
            link,
            shutdown_grace: robot.shutdown_grace(),
        }
    }

    /// Home the arm, follow both cameras until either stream ends, then
    /// wait out the grace period, home again and close the link.
    ///
    /// A fatal error goes through the same grace wait, home and close on a
    /// best-effort basis before it is returned.
    pub fn run(mut self, top: SampleSubscriber, bottom: SampleSubscriber) -> Result<ControlReport> {
        let outcome = self
            .link
            .home()
            .and_then(|()| self.follow(&top, &bottom));
        // Unblocks workers still waiting on a full channel.
        drop(top);
        drop(bottom);

        let Self {
            mut link,
            shutdown_grace,
        } = self;
        match outcome {
            Ok(stats) => {
                info!(
                    cycles = stats.cycles,
                    moves = stats.moves,
                    grace_ms = shutdown_grace.as_millis() as u64,
                    "streams ended, shutting down"
                );
                thread::sleep(shutdown_grace);
                link.home()?;
                let final_pose = link.pose();
                link.close()?;
                Ok(ControlReport {
                    cycles: stats.cycles,
                    moves: stats.moves,
                    final_pose,
                })
            }
            Err(e) => {
                error!(
                    error = %e,
                    grace_ms = shutdown_grace.as_millis() as u64,
                    "control loop aborted, attempting safe stop"
                );
                // Let an in-flight move finish before homing.
                thread::sleep(shutdown_grace);
                if let Err(home_err) = link.home() {
                    warn!(error = %home_err, "could not home after abort");
                }
                if let Err(close_err) = link.close() {
                    warn!(error = %close_err, "could not close robot link after abort");
                }
                Err(e)
            }
        }
    }

    fn follow(&mut self, top: &SampleSubscriber, bottom: &SampleSubscriber) -> Result<LoopStats> {
        let mut stats = LoopStats::default();
        loop {
            top.wait_ready();
            bottom.wait_ready();

            let (top_outcome, bottom_outcome) = match (top.take(), bottom.take()) {
                (
                    DisplacementSample::Cycle {
                        cycle_id: top_id,
                        outcome: top_outcome,
                    },
                    DisplacementSample::Cycle {
                        cycle_id: bottom_id,
                        outcome: bottom_outcome,
                    },
                ) => {
                    if top_id != bottom_id {
                        return Err(ServoError::CycleMismatch {
                            top: top_id,
                            bottom: bottom_id,
                        });
                    }
                    (top_outcome, bottom_outcome)
                }
                (top_sample, bottom_sample) => {
                    info!(top = ?top_sample, bottom = ?bottom_sample, "camera stream ended");
                    return Ok(stats);
                }
            };

            match combine(&top_outcome, &bottom_outcome) {
                Some(delta) => {
                    self.link.move_by(delta)?;
                    stats.moves += 1;
                }
                None => debug!(cycle = stats.cycles, "neither camera tracked, holding pose"),
            }

            top.acknowledge();
            bottom.acknowledge();
            stats.cycles += 1;
        }
    }
}

/// Pose change for one cycle.
///
/// The top camera drives j6 from its rotation and x/y from its translation;
/// the bottom camera drives j5 from its rotation and z from its vertical
/// translation. A camera that did not track contributes nothing. Returns
/// `None` when neither did.
pub fn combine(top: &CycleOutcome, bottom: &CycleOutcome) -> Option<PoseDelta> {
    let (top, bottom) = (top.displacement(), bottom.displacement());
    if top.is_none() && bottom.is_none() {
        return None;
    }
    let mut delta = PoseDelta::default();
    if let Some(t) = top {
        delta.j6_deg = t.rotation_deg as f32;
        delta.x_mm = t.dx_mm as f32;
        delta.y_mm = t.dy_mm as f32;
    }
    if let Some(b) = bottom {
        delta.j5_deg = b.rotation_deg as f32;
        delta.z_mm = b.dy_mm as f32;
    }
    Some(delta)
}
