pub mod aggregator;
pub mod config;
pub mod controller;
pub mod error;
pub mod liveness;
pub mod replay;
pub mod runner;
pub mod sampler;
pub mod signal;
pub mod storage;

// Re-export vision types for convenience
pub use facelive_vision::{capture, model, pose, video, CaptureSettings, PoseEstimate};

pub use aggregator::{CapturedImage, OnCapture};
pub use controller::{Controller, ControllerSettings, TickOutcome};
pub use error::LivenessError;
pub use liveness::{LivenessStep, Status, Thresholds};
pub use signal::{CancelToken, CapturingFlag};
