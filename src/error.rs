use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the capture controller and its run loop.
#[derive(Debug, Error)]
pub enum LivenessError {
    /// Camera or stream unavailable. The caller may retry.
    #[error("camera {device} unavailable")]
    ResourceAcquisition {
        device: String,
        #[source]
        source: BoxError,
    },

    /// The vision model could not be loaded; the controller is unusable.
    #[error("vision model failed to initialize: {reason}")]
    ModelInitialization { reason: String },

    /// A single frame could not be classified. Treated as "no face".
    #[error("frame {timestamp_ms} could not be classified")]
    FrameClassification {
        timestamp_ms: u64,
        #[source]
        source: BoxError,
    },

    #[error("invalid configuration")]
    Config {
        #[source]
        source: BoxError,
    },
}

impl LivenessError {
    pub fn resource(device: impl Into<String>, err: anyhow::Error) -> Self {
        Self::ResourceAcquisition {
            device: device.into(),
            source: err.into(),
        }
    }

    pub fn classification(timestamp_ms: u64, err: anyhow::Error) -> Self {
        Self::FrameClassification {
            timestamp_ms,
            source: err.into(),
        }
    }

    pub fn config(err: anyhow::Error) -> Self {
        Self::Config { source: err.into() }
    }

    /// Whether the caller can try again with the same controller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ResourceAcquisition { .. } | Self::FrameClassification { .. }
        )
    }
}
