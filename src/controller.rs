//! Per-frame capture controller.
//!
//! One [`Controller::tick`] call runs the whole chain synchronously:
//! frame dedup, pose classification, step evaluation and, when a hold
//! completes, capture extraction and aggregation.

use facelive_vision::{
    capture, pose, CaptureSettings, FrameSource, ModelState, VisionModel,
};

use crate::aggregator::{Aggregator, CapturedImage, OnCapture};
use crate::config::Config;
use crate::error::LivenessError;
use crate::liveness::{LivenessStep, Status, StepMachine, Thresholds};
use crate::sampler::{FrameSampler, Sample};
use crate::signal::CapturingFlag;

/// Tunables for one controller instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSettings {
    pub thresholds: Thresholds,
    pub capture: CaptureSettings,
}

impl ControllerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            thresholds: cfg.liveness.thresholds(),
            capture: cfg.capture.settings(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Capturing flag is set; nothing was looked at.
    Suspended,
    /// Vision model not loaded yet.
    ModelLoading,
    /// Frame position unchanged since the last tick.
    Duplicate,
    /// Frame classified, no capture this tick.
    Observed(Status),
    /// Capture taken for the given step, sequence continues.
    Captured(LivenessStep),
    /// Last capture taken and the completion callback fired.
    Completed,
    /// Sequence already complete; tick ignored.
    Finished,
}

/// Mutable state carried from tick to tick.
pub struct ControllerState {
    pub sampler: FrameSampler,
    pub machine: StepMachine,
    pub aggregator: Aggregator,
    pub status: Option<Status>,
}

pub struct Controller<M> {
    state: ControllerState,
    model: ModelState<M>,
    settings: ControllerSettings,
    capturing: CapturingFlag,
}

impl<M: VisionModel> Controller<M> {
    pub fn new(model: ModelState<M>, settings: ControllerSettings, on_capture: OnCapture) -> Self {
        Self {
            state: ControllerState {
                sampler: FrameSampler::new(),
                machine: StepMachine::new(),
                aggregator: Aggregator::new(on_capture),
                status: None,
            },
            model,
            settings,
            capturing: CapturingFlag::new(),
        }
    }

    /// Share an externally owned capturing flag.
    pub fn with_capturing_flag(mut self, flag: CapturingFlag) -> Self {
        self.capturing = flag;
        self
    }

    pub fn capturing_flag(&self) -> CapturingFlag {
        self.capturing.clone()
    }

    pub fn step(&self) -> LivenessStep {
        self.state.machine.step()
    }

    pub fn status(&self) -> Option<Status> {
        self.state.status
    }

    pub fn captured(&self) -> &[CapturedImage] {
        self.state.aggregator.images()
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn is_complete(&self) -> bool {
        self.state.machine.step().is_complete()
    }

    pub fn is_suspended(&self) -> bool {
        self.capturing.is_set()
    }

    pub fn model_ready(&self) -> bool {
        self.model.is_ready()
    }

    /// Start a fresh attempt. The loaded model and the timestamp floor survive.
    pub fn reset(&mut self, on_capture: OnCapture) {
        self.state.machine.reset();
        self.state.aggregator.reset(on_capture);
        self.state.sampler.forget_position();
        self.state.status = None;
        log::info!("controller reset");
    }

    /// The frame stream was lost. Treated like a lost face: the hold timer
    /// restarts and the next frame from any source counts as new.
    pub fn interrupt(&mut self) {
        self.state.machine.lose_detection();
        self.state.sampler.forget_position();
        self.set_status(Status::DetectionLost);
    }

    /// Process whatever `source` currently shows. `wall_ms` is the caller's
    /// clock; it may stall or jump backwards.
    pub fn tick<S: FrameSource>(
        &mut self,
        source: &S,
        wall_ms: u64,
    ) -> Result<TickOutcome, LivenessError> {
        if self.is_complete() {
            return Ok(TickOutcome::Finished);
        }
        if self.capturing.is_set() {
            return Ok(TickOutcome::Suspended);
        }

        self.model.poll();
        let model = match &mut self.model {
            ModelState::Loading(_) => return Ok(TickOutcome::ModelLoading),
            ModelState::Failed(reason) => {
                return Err(LivenessError::ModelInitialization {
                    reason: reason.clone(),
                })
            }
            ModelState::Ready(model) => model,
        };

        let timestamp = match self.state.sampler.sample(source.position(), wall_ms) {
            Sample::Duplicate => return Ok(TickOutcome::Duplicate),
            Sample::Fresh { timestamp } => timestamp,
        };

        let estimate = match model.detect(source.frame(), timestamp) {
            Ok(matrix) => pose::decode_optional(matrix.as_ref()),
            Err(err) => {
                let err = LivenessError::classification(timestamp, err);
                log::warn!("{}: {}", err, error_chain(&err));
                let obs = self
                    .state
                    .machine
                    .observe(None, timestamp, &self.settings.thresholds);
                self.set_status(obs.status);
                return Ok(TickOutcome::Observed(obs.status));
            }
        };
        if let Some(p) = &estimate {
            log::debug!("t={} yaw={:.1} pitch={:.1}", timestamp, p.yaw, p.pitch);
        }

        let obs = self
            .state
            .machine
            .observe(estimate.as_ref(), timestamp, &self.settings.thresholds);
        self.set_status(obs.status);

        let Some(step) = obs.trigger else {
            return Ok(TickOutcome::Observed(obs.status));
        };

        let (display_width, display_height) = source.display_size();
        let capture = match capture::extract(
            source.frame(),
            display_width,
            display_height,
            &self.settings.capture,
        ) {
            Ok(capture) => capture,
            Err(err) => {
                log::warn!("capture for {} failed, hold again: {:#}", step, err);
                return Ok(TickOutcome::Observed(obs.status));
            }
        };

        let next = self.state.machine.advance();
        log::info!("step {} done, now {}", step, next);
        if self.state.aggregator.push(step, capture) {
            self.set_status(Status::Processing);
            Ok(TickOutcome::Completed)
        } else {
            Ok(TickOutcome::Captured(step))
        }
    }

    fn set_status(&mut self, status: Status) {
        if self.state.status != Some(status) {
            log::info!("{}", status);
            self.state.status = Some(status);
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use facelive_vision::{StillSource, TransformMatrix};
    use image::RgbImage;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Result<Option<TransformMatrix>>>);

    impl VisionModel for Scripted {
        fn detect(&mut self, _: &RgbImage, _: u64) -> Result<Option<TransformMatrix>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    fn controller(script: Vec<Result<Option<TransformMatrix>>>) -> Controller<Scripted> {
        Controller::new(
            ModelState::Ready(Scripted(script.into())),
            ControllerSettings::default(),
            Box::new(|_| {}),
        )
    }

    fn source() -> StillSource {
        StillSource::new(RgbImage::new(640, 480), (300.0, 400.0))
    }

    #[test]
    fn duplicate_frame_does_not_consume_model() {
        let right = pose::transform_from_pose(-20.0, 0.0);
        let mut c = controller(vec![Ok(Some(right))]);
        let mut src = source();
        src.advance();
        assert!(matches!(c.tick(&src, 0).unwrap(), TickOutcome::Observed(_)));
        assert_eq!(c.tick(&src, 2_000).unwrap(), TickOutcome::Duplicate);
        assert_eq!(c.state().machine.hold_start(), Some(0));
    }

    #[test]
    fn classification_error_counts_as_lost_face() {
        let right = pose::transform_from_pose(-20.0, 0.0);
        let mut c = controller(vec![
            Ok(Some(right)),
            Err(anyhow::anyhow!("inference failed")),
            Ok(Some(right)),
        ]);
        let mut src = source();
        for t in [0, 600, 1_200] {
            src.advance();
            c.tick(&src, t).unwrap();
        }
        assert_eq!(c.step(), LivenessStep::AwaitRight);
        assert_eq!(c.state().machine.hold_start(), Some(1_200));
        assert!(c.captured().is_empty());
    }

    #[test]
    fn failed_model_is_terminal() {
        let mut c: Controller<Scripted> = Controller::new(
            ModelState::Failed("corrupt model".into()),
            ControllerSettings::default(),
            Box::new(|_| {}),
        );
        let mut src = source();
        src.advance();
        let err = c.tick(&src, 0).unwrap_err();
        assert!(matches!(err, LivenessError::ModelInitialization { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn suspended_ticks_keep_state() {
        let right = pose::transform_from_pose(-20.0, 0.0);
        let mut c = controller((0..4).map(|_| Ok(Some(right))).collect());
        let flag = c.capturing_flag();
        let mut src = source();
        src.advance();
        c.tick(&src, 0).unwrap();

        flag.set(true);
        src.advance();
        assert_eq!(c.tick(&src, 500).unwrap(), TickOutcome::Suspended);
        assert_eq!(c.state().machine.hold_start(), Some(0));

        flag.set(false);
        assert_eq!(
            c.tick(&src, 1_100).unwrap(),
            TickOutcome::Captured(LivenessStep::AwaitRight)
        );
    }

    #[test]
    fn failed_capture_keeps_step_and_restarts_hold() {
        let right = pose::transform_from_pose(-20.0, 0.0);
        let mut c = controller(vec![Ok(Some(right)), Ok(Some(right))]);
        // a degenerate display makes the crop geometry unrepresentable
        let mut src = StillSource::new(RgbImage::new(640, 480), (0.0, 0.0));
        src.advance();
        c.tick(&src, 0).unwrap();
        src.advance();
        assert_eq!(
            c.tick(&src, 1_100).unwrap(),
            TickOutcome::Observed(Status::Holding(LivenessStep::AwaitRight))
        );
        assert_eq!(c.step(), LivenessStep::AwaitRight);
        assert_eq!(c.state().machine.hold_start(), None);
        assert!(c.captured().is_empty());
    }

    #[test]
    fn interrupted_stream_drops_the_hold() {
        let right = pose::transform_from_pose(-20.0, 0.0);
        let mut c = controller(vec![Ok(Some(right)), Ok(Some(right)), Ok(Some(right))]);
        let mut src = source();
        src.advance();
        c.tick(&src, 0).unwrap();
        assert_eq!(c.state().machine.hold_start(), Some(0));

        c.interrupt();
        assert_eq!(c.state().machine.hold_start(), None);
        assert_eq!(c.status(), Some(Status::DetectionLost));

        // a reopened device may restart its sequence at the same position
        assert_eq!(
            c.tick(&src, 10_000).unwrap(),
            TickOutcome::Observed(Status::Holding(LivenessStep::AwaitRight))
        );
        assert_eq!(c.state().machine.hold_start(), Some(10_000));
        src.advance();
        assert_eq!(
            c.tick(&src, 11_001).unwrap(),
            TickOutcome::Captured(LivenessStep::AwaitRight)
        );
    }
}
