use std::thread;
use std::time::{Duration, Instant};

use facelive_vision::{Camera, CameraSource, LiveSource, VisionModel};

use crate::controller::{Controller, TickOutcome};
use crate::error::LivenessError;
use crate::signal::CancelToken;

/// Poll interval while the capturing flag is set.
const SUSPEND_POLL: Duration = Duration::from_millis(20);
/// Consecutive frame read failures tolerated before the stream counts as lost.
const MAX_READ_FAILURES: u32 = 30;

/// Why [`run_camera`] returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Completed,
    Cancelled,
}

/// Open `device`, then tick `controller` on every new frame until the
/// sequence completes, `cancel` fires or the stream fails. The camera is
/// released before returning.
///
/// `cancel` is checked around each dequeue, but a dequeue itself blocks
/// until the driver hands over a frame: a stalled camera delays
/// cancellation until it produces one or the read errors out.
///
/// On error the controller's running hold is dropped, so a retry with the
/// same controller starts timing from scratch.
pub fn run_camera<M: VisionModel>(
    controller: &mut Controller<M>,
    device: &str,
    display: (f64, f64),
    cancel: &CancelToken,
) -> Result<RunEnd, LivenessError> {
    let camera = Camera::open(device).map_err(|e| LivenessError::resource(device, e))?;
    let mut source =
        CameraSource::new(camera, display).map_err(|e| LivenessError::resource(device, e))?;
    log::info!("camera {} acquired", device);

    let result = drive(controller, &mut source, device, cancel);

    drop(source);
    log::info!("camera {} released", device);
    result
}

/// Tick `controller` from `source` until completion, cancellation or a
/// stream failure. A failure drops the running hold before returning.
fn drive<M: VisionModel, S: LiveSource>(
    controller: &mut Controller<M>,
    source: &mut S,
    device: &str,
    cancel: &CancelToken,
) -> Result<RunEnd, LivenessError> {
    let result = pump(controller, source, device, cancel);
    if result.is_err() {
        controller.interrupt();
    }
    result
}

fn pump<M: VisionModel, S: LiveSource>(
    controller: &mut Controller<M>,
    source: &mut S,
    device: &str,
    cancel: &CancelToken,
) -> Result<RunEnd, LivenessError> {
    let epoch = Instant::now();
    let mut failures = 0u32;

    loop {
        if cancel.is_cancelled() {
            log::info!("capture loop cancelled at step {}", controller.step());
            return Ok(RunEnd::Cancelled);
        }
        if controller.is_suspended() {
            thread::sleep(SUSPEND_POLL);
            continue;
        }

        if let Err(err) = source.refresh() {
            failures += 1;
            log::warn!("frame read failed ({}/{}): {:#}", failures, MAX_READ_FAILURES, err);
            if failures >= MAX_READ_FAILURES {
                return Err(LivenessError::resource(device, err));
            }
            continue;
        }
        failures = 0;
        if cancel.is_cancelled() {
            log::info!("capture loop cancelled at step {}", controller.step());
            return Ok(RunEnd::Cancelled);
        }

        let now = epoch.elapsed().as_millis() as u64;
        match controller.tick(&*source, now)? {
            TickOutcome::Completed | TickOutcome::Finished => return Ok(RunEnd::Completed),
            TickOutcome::Captured(step) => log::debug!("captured {} at {}ms", step, now),
            _ => {}
        }
    }
}
