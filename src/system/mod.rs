//! Session orchestration: capture worker threads, the controller thread and
//! the per-camera links that connect them.

pub mod capture_worker;
pub mod controller;
pub mod messages;
pub mod rendezvous;
mod servo_system;

pub use capture_worker::{CaptureWorker, WorkerReport, run_camera};
pub use controller::{ControlReport, Controller, combine};
pub use messages::{
    CameraRole, CycleOutcome, Displacement, DisplacementSample, FailureKind, SkipReason,
};
pub use rendezvous::{SamplePublisher, SampleSubscriber, camera_link};
pub use servo_system::{ServoSystem, SessionReport};
