use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use facelive::{
    replay, CapturedImage, Controller, ControllerSettings, LivenessStep, Status, TickOutcome,
};
use facelive_vision::{pose, ModelState, StillSource, TransformMatrix, VisionModel};
use image::RgbImage;

/// Answers detections from a queue, recording the timestamps it was called with.
struct Scripted {
    poses: VecDeque<Option<TransformMatrix>>,
    timestamps: Arc<Mutex<Vec<u64>>>,
}

impl VisionModel for Scripted {
    fn detect(&mut self, _: &RgbImage, timestamp_ms: u64) -> Result<Option<TransformMatrix>> {
        self.timestamps.lock().unwrap().push(timestamp_ms);
        Ok(self.poses.pop_front().flatten())
    }
}

struct Harness {
    controller: Controller<Scripted>,
    source: StillSource,
    deliveries: Arc<Mutex<Vec<Vec<CapturedImage>>>>,
    timestamps: Arc<Mutex<Vec<u64>>>,
}

impl Harness {
    /// `samples`: (wall ms, optional (yaw, pitch)) for consecutive new frames.
    fn run(samples: &[(u64, Option<(f32, f32)>)]) -> (Self, Vec<TickOutcome>) {
        let poses = samples
            .iter()
            .map(|(_, p)| p.map(|(yaw, pitch)| pose::transform_from_pose(yaw, pitch)))
            .collect();
        let timestamps = Arc::new(Mutex::new(Vec::new()));
        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let sink = deliveries.clone();
        let controller = Controller::new(
            ModelState::Ready(Scripted {
                poses,
                timestamps: timestamps.clone(),
            }),
            ControllerSettings::default(),
            Box::new(move |images| sink.lock().unwrap().push(images)),
        );
        let mut harness = Self {
            controller,
            source: StillSource::new(RgbImage::new(640, 480), (300.0, 400.0)),
            deliveries,
            timestamps,
        };
        let outcomes = samples
            .iter()
            .map(|(t, _)| harness.frame(*t))
            .collect();
        (harness, outcomes)
    }

    fn frame(&mut self, t: u64) -> TickOutcome {
        self.source.advance();
        self.controller.tick(&self.source, t).unwrap()
    }
}

/// 30 fps samples of a constant pose over `[start, end]`.
fn hold(start: u64, end: u64, pose: Option<(f32, f32)>) -> Vec<(u64, Option<(f32, f32)>)> {
    (start..=end).step_by(33).map(|t| (t, pose)).collect()
}

fn captures(outcomes: &[TickOutcome]) -> Vec<LivenessStep> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            TickOutcome::Captured(step) => Some(*step),
            TickOutcome::Completed => Some(LivenessStep::AwaitStraight),
            _ => None,
        })
        .collect()
}

const RIGHT: Option<(f32, f32)> = Some((-20.0, 0.0));
const LEFT: Option<(f32, f32)> = Some((16.0, 0.0));
const STRAIGHT: Option<(f32, f32)> = Some((2.0, 3.0));

#[test]
fn right_hold_of_1200ms_captures_once() {
    let (h, outcomes) = Harness::run(&hold(0, 1200, RIGHT));
    assert_eq!(captures(&outcomes), vec![LivenessStep::AwaitRight]);
    assert_eq!(h.controller.step(), LivenessStep::AwaitLeft);
    assert_eq!(h.controller.captured().len(), 1);
}

#[test]
fn interrupted_left_hold_needs_fresh_second() {
    let mut samples = vec![(0, RIGHT), (1001, RIGHT)];
    // 600ms of left, then face lost, then left again
    samples.extend(hold(2000, 2600, LEFT));
    samples.push((2650, None));
    samples.extend(hold(2700, 3700, LEFT));
    let (h, outcomes) = Harness::run(&samples);

    // 600 + 1000 would exceed the threshold if time accumulated
    assert_eq!(captures(&outcomes), vec![LivenessStep::AwaitRight]);
    assert_eq!(h.controller.step(), LivenessStep::AwaitLeft);

    let (h, outcomes) = Harness::run(&[samples, vec![(3701, LEFT)]].concat());
    assert_eq!(
        captures(&outcomes),
        vec![LivenessStep::AwaitRight, LivenessStep::AwaitLeft]
    );
    assert_eq!(h.controller.step(), LivenessStep::AwaitStraight);
}

#[test]
fn full_sequence_delivers_three_images_once() {
    let mut samples = hold(0, 1100, RIGHT);
    samples.extend(hold(1200, 2300, LEFT));
    samples.extend(hold(2400, 3500, STRAIGHT));
    let (mut h, outcomes) = Harness::run(&samples);

    let completions = outcomes
        .iter()
        .filter(|o| **o == TickOutcome::Completed)
        .count();
    assert_eq!(completions, 1);
    assert_eq!(outcomes.last(), Some(&TickOutcome::Finished));
    assert_eq!(h.controller.step(), LivenessStep::Complete);
    assert_eq!(h.controller.status(), Some(Status::Processing));

    // ticks after completion are no-ops
    assert_eq!(h.frame(4000), TickOutcome::Finished);
    assert_eq!(h.frame(5000), TickOutcome::Finished);

    let deliveries = h.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    let steps: Vec<_> = deliveries[0].iter().map(|c| c.step).collect();
    assert_eq!(steps, LivenessStep::CAPTURE_STEPS.to_vec());
    for image in deliveries[0].iter() {
        assert_eq!((image.capture.width, image.capture.height), (640, 851));
    }
}

#[test]
fn steps_never_skip_or_regress() {
    // a straight pose while awaiting right must not advance anything
    let mut samples = hold(0, 1500, STRAIGHT);
    samples.extend(hold(1600, 2800, LEFT));
    samples.extend(hold(2900, 4100, RIGHT));
    let (h, _) = Harness::run(&samples);
    assert_eq!(h.controller.step(), LivenessStep::AwaitLeft);
    assert_eq!(h.controller.captured().len(), 1);
}

#[test]
fn tied_wall_clock_yields_increasing_model_timestamps() {
    let (h, _) = Harness::run(&[(100, None), (100, None), (90, None), (101, None)]);
    let ts = h.timestamps.lock().unwrap().clone();
    assert_eq!(ts, vec![100, 101, 102, 103]);
}

#[test]
fn duplicate_frames_do_not_extend_holds() {
    let (mut h, _) = Harness::run(&[(0, RIGHT)]);
    // same frame position seen again much later
    assert_eq!(
        h.controller.tick(&h.source, 5_000).unwrap(),
        TickOutcome::Duplicate
    );
    assert_eq!(h.controller.step(), LivenessStep::AwaitRight);
    assert_eq!(h.timestamps.lock().unwrap().len(), 1);
}

#[test]
fn reset_starts_a_new_attempt() {
    let (mut h, _) = Harness::run(&hold(0, 1200, RIGHT));
    assert_eq!(h.controller.step(), LivenessStep::AwaitLeft);
    h.controller.reset(Box::new(|_| {}));
    assert_eq!(h.controller.step(), LivenessStep::AwaitRight);
    assert!(h.controller.captured().is_empty());
    assert_eq!(h.controller.status(), None);
}

#[test]
fn loading_model_gates_ticks() {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let mut controller: Controller<Scripted> = Controller::new(
        ModelState::Loading(rx),
        ControllerSettings::default(),
        Box::new(|_| {}),
    );
    let mut source = StillSource::new(RgbImage::new(64, 48), (300.0, 400.0));
    source.advance();
    assert_eq!(controller.tick(&source, 0).unwrap(), TickOutcome::ModelLoading);

    let timestamps = Arc::new(Mutex::new(Vec::new()));
    tx.send(Ok(Scripted {
        poses: VecDeque::new(),
        timestamps: timestamps.clone(),
    }))
    .unwrap();
    assert_eq!(
        controller.tick(&source, 10).unwrap(),
        TickOutcome::Observed(Status::DetectionLost)
    );
    assert!(controller.model_ready());
    assert_eq!(*timestamps.lock().unwrap(), vec![10]);
}

#[test]
fn replay_trace_completes_sequence() -> Result<()> {
    let mut entries = Vec::new();
    for (range, yaw) in [(0..=1100u64, -25.0f32), (1200..=2300, 20.0), (2400..=3500, 0.0)] {
        for t in range.step_by(50) {
            entries.push(replay::TraceEntry {
                t,
                yaw: Some(yaw),
                pitch: Some(0.0),
            });
        }
    }
    let delivered = Arc::new(Mutex::new(0usize));
    let counter = delivered.clone();
    let mut controller = Controller::new(
        ModelState::Ready(replay::TraceModel::new(&entries)),
        ControllerSettings::default(),
        Box::new(move |images| *counter.lock().unwrap() = images.len()),
    );
    let outcomes = replay::replay(&mut controller, &entries, (300.0, 400.0))?;
    assert_eq!(outcomes.last().map(|(_, o)| *o), Some(TickOutcome::Completed));
    assert_eq!(*delivered.lock().unwrap(), 3);
    Ok(())
}
