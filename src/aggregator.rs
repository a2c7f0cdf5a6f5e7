use facelive_vision::EncodedCapture;

use crate::liveness::LivenessStep;

pub const CAPTURE_COUNT: usize = 3;

/// One encoded image tagged with the step it was taken at.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub step: LivenessStep,
    pub capture: EncodedCapture,
}

/// Completion callback, receives the ordered right/left/straight captures.
pub type OnCapture = Box<dyn FnOnce(Vec<CapturedImage>) + Send>;

/// Collects captures in step order and fires the completion callback once.
pub struct Aggregator {
    images: Vec<CapturedImage>,
    on_capture: Option<OnCapture>,
    frozen: bool,
}

impl Aggregator {
    pub fn new(on_capture: OnCapture) -> Self {
        Self {
            images: Vec::with_capacity(CAPTURE_COUNT),
            on_capture: Some(on_capture),
            frozen: false,
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.frozen
    }

    pub fn images(&self) -> &[CapturedImage] {
        &self.images
    }

    /// Append the capture for `step`. Returns `true` once the set is complete
    /// and the callback has been invoked.
    pub fn push(&mut self, step: LivenessStep, capture: EncodedCapture) -> bool {
        if self.frozen {
            log::warn!("capture for {} after completion ignored", step);
            return true;
        }
        let expected = LivenessStep::CAPTURE_STEPS[self.images.len()];
        if step != expected {
            log::warn!("capture for {} out of order, expected {}", step, expected);
            return false;
        }

        log::info!(
            "captured {} ({}x{}, {} bytes)",
            step,
            capture.width,
            capture.height,
            capture.jpeg.len()
        );
        self.images.push(CapturedImage { step, capture });

        if self.images.len() < CAPTURE_COUNT {
            return false;
        }
        self.frozen = true;
        if let Some(callback) = self.on_capture.take() {
            callback(self.images.clone());
        }
        true
    }

    /// Drop collected images and arm a new callback for another attempt.
    pub fn reset(&mut self, on_capture: OnCapture) {
        self.images.clear();
        self.on_capture = Some(on_capture);
        self.frozen = false;
    }
}
