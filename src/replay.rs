//! Drive the controller from a recorded pose trace instead of a camera.
//!
//! Trace format: a JSON array of `{ "t": 0, "yaw": -20.0, "pitch": 1.5 }`
//! entries; an entry without `yaw` means no face at that instant.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use facelive_vision::{pose, StillSource, TransformMatrix, VisionModel};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::controller::{Controller, TickOutcome};
use crate::error::LivenessError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub t: u64,
    #[serde(default)]
    pub yaw: Option<f32>,
    #[serde(default)]
    pub pitch: Option<f32>,
}

impl TraceEntry {
    fn transform(&self) -> Option<TransformMatrix> {
        self.yaw
            .map(|yaw| pose::transform_from_pose(yaw, self.pitch.unwrap_or(0.0)))
    }
}

pub fn load_trace(path: &Path) -> Result<Vec<TraceEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading trace {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing trace {}", path.display()))
}

/// Model that answers each detection with the next trace sample.
pub struct TraceModel {
    queue: VecDeque<Option<TransformMatrix>>,
}

impl TraceModel {
    pub fn new(entries: &[TraceEntry]) -> Self {
        Self {
            queue: entries.iter().map(TraceEntry::transform).collect(),
        }
    }
}

impl VisionModel for TraceModel {
    fn detect(&mut self, _frame: &RgbImage, _timestamp_ms: u64) -> Result<Option<TransformMatrix>> {
        self.queue
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("trace exhausted"))
    }
}

/// Synthetic VGA frame with a horizontal gradient.
pub fn synthetic_frame() -> RgbImage {
    RgbImage::from_fn(640, 480, |x, y| {
        let v = (x * 255 / 639) as u8;
        Rgb([v, (y * 255 / 479) as u8, 255 - v])
    })
}

/// Feed every trace entry as a new frame at its timestamp. Stops early
/// once the sequence completes.
pub fn replay<M: VisionModel>(
    controller: &mut Controller<M>,
    entries: &[TraceEntry],
    display: (f64, f64),
) -> Result<Vec<(u64, TickOutcome)>, LivenessError> {
    let mut source = StillSource::new(synthetic_frame(), display);
    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in entries {
        source.advance();
        let outcome = controller.tick(&source, entry.t)?;
        outcomes.push((entry.t, outcome));
        if outcome == TickOutcome::Completed {
            break;
        }
    }
    Ok(outcomes)
}
