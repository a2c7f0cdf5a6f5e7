//! Liveness step sequencing.
//!
//! The subject turns right, then left, then looks straight at the camera.
//! Each pose has to be held without interruption for longer than
//! [`Thresholds::hold_ms`] before the step's capture is taken.

use std::fmt;

use facelive_vision::PoseEstimate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessStep {
    AwaitRight,
    AwaitLeft,
    AwaitStraight,
    Complete,
}

impl LivenessStep {
    pub const CAPTURE_STEPS: [LivenessStep; 3] = [
        LivenessStep::AwaitRight,
        LivenessStep::AwaitLeft,
        LivenessStep::AwaitStraight,
    ];

    pub fn next(self) -> Self {
        match self {
            LivenessStep::AwaitRight => LivenessStep::AwaitLeft,
            LivenessStep::AwaitLeft => LivenessStep::AwaitStraight,
            LivenessStep::AwaitStraight | LivenessStep::Complete => LivenessStep::Complete,
        }
    }

    pub fn is_complete(self) -> bool {
        self == LivenessStep::Complete
    }

    /// Short name used in file names and logs.
    pub fn label(self) -> &'static str {
        match self {
            LivenessStep::AwaitRight => "right",
            LivenessStep::AwaitLeft => "left",
            LivenessStep::AwaitStraight => "straight",
            LivenessStep::Complete => "complete",
        }
    }

    /// Whether `pose` satisfies this step's target.
    pub fn is_satisfied(self, pose: &PoseEstimate, t: &Thresholds) -> bool {
        match self {
            LivenessStep::AwaitRight => pose.yaw < -t.turn_yaw,
            LivenessStep::AwaitLeft => pose.yaw > t.turn_yaw,
            LivenessStep::AwaitStraight => {
                (-t.straight_yaw..=t.straight_yaw).contains(&pose.yaw)
                    && (t.straight_pitch_min..=t.straight_pitch_max).contains(&pose.pitch)
            }
            LivenessStep::Complete => false,
        }
    }
}

impl fmt::Display for LivenessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Angles in degrees, durations in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub turn_yaw: f32,
    pub straight_yaw: f32,
    pub straight_pitch_min: f32,
    pub straight_pitch_max: f32,
    pub hold_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            turn_yaw: 15.0,
            straight_yaw: 15.0,
            straight_pitch_min: -10.0,
            straight_pitch_max: 15.0,
            hold_ms: 1000,
        }
    }
}

/// User-facing guidance for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Prompt(LivenessStep),
    Holding(LivenessStep),
    DetectionLost,
    Processing,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Prompt(LivenessStep::AwaitRight) => "Turn your head to the right",
            Status::Prompt(LivenessStep::AwaitLeft) => "Turn your head to the left",
            Status::Prompt(LivenessStep::AwaitStraight) => "Look straight at the camera",
            Status::Holding(LivenessStep::AwaitRight) => "Hold still, facing right...",
            Status::Holding(LivenessStep::AwaitLeft) => "Hold still, facing left...",
            Status::Holding(LivenessStep::AwaitStraight) => "Hold still, facing the camera...",
            Status::DetectionLost => "No face detected",
            Status::Processing
            | Status::Prompt(LivenessStep::Complete)
            | Status::Holding(LivenessStep::Complete) => "Processing...",
        };
        f.write_str(text)
    }
}

/// Result of feeding one pose sample to the [`StepMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub status: Status,
    /// Set when the hold threshold was crossed; the capture for this step is due.
    pub trigger: Option<LivenessStep>,
}

/// Current step plus the start of the ongoing hold streak.
#[derive(Debug, Clone, PartialEq)]
pub struct StepMachine {
    step: LivenessStep,
    hold_start: Option<u64>,
}

impl Default for StepMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StepMachine {
    pub fn new() -> Self {
        Self {
            step: LivenessStep::AwaitRight,
            hold_start: None,
        }
    }

    pub fn step(&self) -> LivenessStep {
        self.step
    }

    pub fn hold_start(&self) -> Option<u64> {
        self.hold_start
    }

    /// Evaluate one processed frame. `pose` is `None` when no face was found.
    ///
    /// A trigger clears the hold timer but leaves the step untouched; the
    /// caller advances with [`StepMachine::advance`] once the capture is taken.
    pub fn observe(&mut self, pose: Option<&PoseEstimate>, now: u64, t: &Thresholds) -> Observation {
        if self.step.is_complete() {
            return Observation {
                status: Status::Processing,
                trigger: None,
            };
        }

        let Some(pose) = pose else {
            self.hold_start = None;
            return Observation {
                status: Status::DetectionLost,
                trigger: None,
            };
        };

        if !self.step.is_satisfied(pose, t) {
            self.hold_start = None;
            return Observation {
                status: Status::Prompt(self.step),
                trigger: None,
            };
        }

        let status = Status::Holding(self.step);
        match self.hold_start {
            None => {
                self.hold_start = Some(now);
                Observation {
                    status,
                    trigger: None,
                }
            }
            Some(start) if now.saturating_sub(start) > t.hold_ms => {
                self.hold_start = None;
                Observation {
                    status,
                    trigger: Some(self.step),
                }
            }
            Some(_) => Observation {
                status,
                trigger: None,
            },
        }
    }

    /// Drop any running hold, as if the face had been lost.
    pub fn lose_detection(&mut self) {
        self.hold_start = None;
    }

    /// Move to the following step. Returns the new step.
    pub fn advance(&mut self) -> LivenessStep {
        self.hold_start = None;
        self.step = self.step.next();
        self.step
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
