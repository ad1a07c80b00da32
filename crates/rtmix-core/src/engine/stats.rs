//! Lock-free engine statistics
//!
//! Written only by the audio thread, read by any number of control threads
//! via relaxed atomics. Counters only ever increase; "resetting" is done on
//! the control side by remembering a baseline (see
//! [`crate::Mixer::fetch_and_reset_stats`]), so the audio thread remains the
//! single writer.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Shared counters, updated once per block by the audio callback
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Absolute frame at which the next block starts
    pub time: AtomicU64,
    pub blocks: AtomicU64,
    pub output_underflows: AtomicU64,
    pub output_overflows: AtomicU64,
    pub input_underflows: AtomicU64,
    pub input_overflows: AtomicU64,
    /// Retired actions dropped because the completion channel was full
    pub dropped_completions: AtomicU64,
    /// Input frames lost because a recording ring buffer was full
    pub dropped_recording_frames: AtomicU64,
    /// Blocks in which a playing ring buffer ran short of frames
    pub ringbuffer_underruns: AtomicU64,
    /// Blocks in which the active set was full and submissions waited
    pub deferred_submissions: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub blocks: u64,
    pub output_underflows: u64,
    pub output_overflows: u64,
    pub input_underflows: u64,
    pub input_overflows: u64,
    pub dropped_completions: u64,
    pub dropped_recording_frames: u64,
    pub ringbuffer_underruns: u64,
    pub deferred_submissions: u64,
}

/// Add `n` to a counter that has a single writer
///
/// A plain load/store pair is enough and avoids a locked RMW on the audio thread.
#[inline]
pub(crate) fn bump(counter: &AtomicU64, n: u64) {
    counter.store(counter.load(Ordering::Relaxed) + n, Ordering::Relaxed);
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current sample time (lock-free)
    #[inline]
    pub fn time(&self) -> u64 {
        self.time.load(Ordering::Acquire)
    }

    /// Copy all counters (lock-free)
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks: self.blocks.load(Ordering::Relaxed),
            output_underflows: self.output_underflows.load(Ordering::Relaxed),
            output_overflows: self.output_overflows.load(Ordering::Relaxed),
            input_underflows: self.input_underflows.load(Ordering::Relaxed),
            input_overflows: self.input_overflows.load(Ordering::Relaxed),
            dropped_completions: self.dropped_completions.load(Ordering::Relaxed),
            dropped_recording_frames: self.dropped_recording_frames.load(Ordering::Relaxed),
            ringbuffer_underruns: self.ringbuffer_underruns.load(Ordering::Relaxed),
            deferred_submissions: self.deferred_submissions.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Counter increase since `earlier`
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            blocks: self.blocks - earlier.blocks,
            output_underflows: self.output_underflows - earlier.output_underflows,
            output_overflows: self.output_overflows - earlier.output_overflows,
            input_underflows: self.input_underflows - earlier.input_underflows,
            input_overflows: self.input_overflows - earlier.input_overflows,
            dropped_completions: self.dropped_completions - earlier.dropped_completions,
            dropped_recording_frames: self.dropped_recording_frames
                - earlier.dropped_recording_frames,
            ringbuffer_underruns: self.ringbuffer_underruns - earlier.ringbuffer_underruns,
            deferred_submissions: self.deferred_submissions - earlier.deferred_submissions,
        }
    }

    /// Total xruns reported by the backend
    pub fn xruns(&self) -> u64 {
        self.output_underflows + self.output_overflows + self.input_underflows + self.input_overflows
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "blocks: {}, output underflows: {}, output overflows: {}, input underflows: {}, \
             input overflows: {}, dropped completions: {}, dropped recording frames: {}, \
             ring buffer underruns: {}, deferred submissions: {}",
            self.blocks,
            self.output_underflows,
            self.output_overflows,
            self.input_underflows,
            self.input_overflows,
            self.dropped_completions,
            self.dropped_recording_frames,
            self.ringbuffer_underruns,
            self.deferred_submissions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_and_snapshot() {
        let stats = EngineStats::new();
        bump(&stats.blocks, 1);
        bump(&stats.blocks, 1);
        bump(&stats.dropped_recording_frames, 40);

        let snap = stats.snapshot();
        assert_eq!(snap.blocks, 2);
        assert_eq!(snap.dropped_recording_frames, 40);
        assert_eq!(snap.xruns(), 0);
    }

    #[test]
    fn test_since_baseline() {
        let stats = EngineStats::new();
        bump(&stats.blocks, 5);
        bump(&stats.output_underflows, 1);
        let baseline = stats.snapshot();

        bump(&stats.blocks, 3);
        let delta = stats.snapshot().since(&baseline);
        assert_eq!(delta.blocks, 3);
        assert_eq!(delta.output_underflows, 0);
    }
}
