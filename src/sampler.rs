/// Outcome of looking at the frame source once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// Same frame as last time; nothing may be recomputed.
    Duplicate,
    /// New frame, to be classified at `timestamp` (ms).
    Fresh { timestamp: u64 },
}

/// Frame dedup and monotonic timestamp generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSampler {
    last_position: Option<u64>,
    last_timestamp: Option<u64>,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `position` with the previous frame and, for a new frame,
    /// produce a timestamp strictly greater than every earlier one.
    pub fn sample(&mut self, position: u64, wall_ms: u64) -> Sample {
        if self.last_position == Some(position) {
            return Sample::Duplicate;
        }
        self.last_position = Some(position);

        let timestamp = match self.last_timestamp {
            Some(prev) => wall_ms.max(prev + 1),
            None => wall_ms,
        };
        self.last_timestamp = Some(timestamp);
        Sample::Fresh { timestamp }
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    /// Forget the last seen frame but keep the timestamp floor.
    pub fn forget_position(&mut self) {
        self.last_position = None;
    }
}
