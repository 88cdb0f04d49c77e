use crate::text::Separator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

pub const MIN_DELAY_MS: u64 = 300;
pub const MAX_DELAY_MS: u64 = 2000;
pub const MIN_SEGMENTS: usize = 5;
pub const MAX_SEGMENTS: usize = 20;

/// Timing and segmentation settings for one line-by-line run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub separator: Separator,
    pub delay: Duration,
    pub max_segments: usize,
}

impl DispatchConfig {
    /// Builds a run configuration, clamping delay and segment cap into their
    /// supported ranges.
    pub fn new(separator: Separator, delay_ms: u64, max_segments: usize) -> Self {
        let clamped_delay = delay_ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS);
        if clamped_delay != delay_ms {
            warn!(
                "Line-by-line delay {}ms out of range, using {}ms",
                delay_ms, clamped_delay
            );
        }

        let clamped_segments = max_segments.clamp(MIN_SEGMENTS, MAX_SEGMENTS);
        if clamped_segments != max_segments {
            warn!(
                "Line-by-line segment cap {} out of range, using {}",
                max_segments, clamped_segments
            );
        }

        Self {
            separator,
            delay: Duration::from_millis(clamped_delay),
            max_segments: clamped_segments,
        }
    }
}

/// Snapshot of a run. `current` counts segments started, `total` is fixed
/// when the run begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub cancelled: bool,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            current: 0,
            total,
            cancelled: false,
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Cancelled,
    TargetMissing,
    SendRejected,
    /// Nothing left to send after normalization.
    Empty,
    /// Another run was already active; nothing was done.
    Busy,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::Cancelled => "cancelled",
            StopReason::TargetMissing => "input not found",
            StopReason::SendRejected => "send failed",
            StopReason::Empty => "nothing to send",
            StopReason::Busy => "already running",
        }
    }

    /// True when the run ended on an environment problem rather than on
    /// completion or a user request.
    pub fn is_abort(&self) -> bool {
        matches!(self, StopReason::TargetMissing | StopReason::SendRejected)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub cancelled: bool,
    pub stop: StopReason,
}

impl DispatchOutcome {
    pub(crate) fn idle(stop: StopReason) -> Self {
        Self {
            sent: 0,
            cancelled: false,
            stop,
        }
    }
}
