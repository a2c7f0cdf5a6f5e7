pub mod capture;
pub mod model;
pub mod pose;
pub mod video;

// Re-export commonly used types
pub use capture::{CaptureSettings, CropGeometry, EncodedCapture};
pub use model::{ModelState, OnnxFaceModel, VisionModel};
pub use pose::{PoseEstimate, TransformMatrix};
pub use video::{Camera, CameraSource, FrameSource, LiveSource, StillSource};
