//! Realtime callback engine
//!
//! [`RealtimeEngine::process`] is called by the audio backend once per block.
//! It must finish within the block duration, so it never locks, allocates,
//! frees, blocks, or logs. Each invocation:
//!
//! 1. Drains submitted actions into the pre-allocated active set
//! 2. Activates due actions (sample-accurate start offset) and resolves due cancels
//! 3. Mixes play actions additively into the zeroed output block
//! 4. Copies input channels into record actions
//! 5. Hands retired actions back to the control side
//! 6. Updates statistics and publishes the sample time
//!
//! Faults are never raised to anybody; they only show up in [`EngineStats`].

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::queue::{ActionBox, RealtimeQueue};
use super::stats::{bump, EngineStats};
use crate::action::{Action, ActionKind, ActionState, ActionType, SAMPLE_SIZE};

/// Per-block xrun flags reported by the audio backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStatus {
    pub output_underflow: bool,
    pub output_overflow: bool,
    pub input_underflow: bool,
    pub input_overflow: bool,
}

/// The audio-thread half of the engine
///
/// Owned exclusively by the audio callback. Created together with its
/// control handle by [`crate::Mixer::new`].
pub struct RealtimeEngine {
    queue: RealtimeQueue,
    /// Queued and active actions; capacity fixed at `capacity`
    active: Vec<ActionBox>,
    capacity: usize,
    input_channels: usize,
    output_channels: usize,
    stats: Arc<EngineStats>,
}

impl RealtimeEngine {
    pub(crate) fn new(
        queue: RealtimeQueue,
        stats: Arc<EngineStats>,
        input_channels: usize,
        output_channels: usize,
        capacity: usize,
    ) -> Self {
        Self {
            queue,
            active: Vec::with_capacity(capacity),
            capacity,
            input_channels,
            output_channels,
            stats,
        }
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Number of actions currently held by the audio thread
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Process one block
    ///
    /// * `input` - interleaved input samples (`frames * input_channels`, may be empty)
    /// * `output` - interleaved output samples to fill (`frames * output_channels`, may be empty)
    /// * `frames` - block length in frames
    /// * `time` - absolute frame of the first frame in this block
    /// * `status` - xrun flags reported by the backend for this block
    pub fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        frames: usize,
        time: u64,
        status: BlockStatus,
    ) {
        self.drain_submissions();
        self.schedule(time, frames);

        output.fill(0.0);

        for action in self.active.iter_mut() {
            if action.state != ActionState::Active {
                continue;
            }
            match action.action_type() {
                ActionType::PlayBuffer => play_buffer(action, output, self.output_channels),
                ActionType::PlayRingbuffer => {
                    play_ringbuffer(action, output, self.output_channels, &self.stats)
                }
                ActionType::RecordBuffer => record_buffer(action, input, self.input_channels),
                ActionType::RecordRingbuffer => {
                    record_ringbuffer(action, input, self.input_channels, &self.stats)
                }
                ActionType::Cancel => {}
            }
            if action.cancel_requested && action.state == ActionState::Active {
                action.state = ActionState::Cancelled;
            }
        }

        self.retire();

        bump(&self.stats.blocks, 1);
        if status.output_underflow {
            bump(&self.stats.output_underflows, 1);
        }
        if status.output_overflow {
            bump(&self.stats.output_overflows, 1);
        }
        if status.input_underflow {
            bump(&self.stats.input_underflows, 1);
        }
        if status.input_overflow {
            bump(&self.stats.input_overflows, 1);
        }
        self.stats
            .time
            .store(time + frames as u64, Ordering::Release);
    }

    /// Move all submitted actions into the active set without growing it
    ///
    /// Admission on the control side keeps the in-flight count within the
    /// set's capacity, so this empties the inbound channel every block.
    fn drain_submissions(&mut self) {
        while self.active.len() < self.capacity {
            match self.queue.pop() {
                Some(action) => self.active.push(action),
                None => return,
            }
        }
        // Only reachable if admission was bypassed; the rest waits in FIFO order
        if self.queue.has_submissions() {
            bump(&self.stats.deferred_submissions, 1);
        }
    }

    /// Set each action's frame window for this block, activate due actions
    /// and apply due cancels
    fn schedule(&mut self, time: u64, frames: usize) {
        for action in self.active.iter_mut() {
            action.begin = 0;
            action.end = frames;
            if action.state == ActionState::Queued {
                match action.start.offset_in_block(time, frames) {
                    Some(offset) => {
                        action.state = ActionState::Active;
                        action.actual_time = Some(time + offset as u64);
                        action.begin = offset;
                    }
                    None => action.end = 0,
                }
            }
        }

        for i in 0..self.active.len() {
            let (target, at) = match (&self.active[i].kind, self.active[i].state) {
                (ActionKind::Cancel { target, .. }, ActionState::Active) => {
                    (*target, self.active[i].begin)
                }
                _ => continue,
            };

            let mut applied = false;
            if let Some(victim) = self
                .active
                .iter_mut()
                .find(|a| a.id == target && !a.state.is_retired())
            {
                applied = true;
                match victim.state {
                    ActionState::Queued => {
                        victim.state = ActionState::Cancelled;
                        victim.end = 0;
                    }
                    _ => {
                        victim.end = victim.end.min(at).max(victim.begin);
                        victim.cancel_requested = true;
                    }
                }
            }

            let cancel = &mut self.active[i];
            if let ActionKind::Cancel { applied: done, .. } = &mut cancel.kind {
                *done = applied;
            }
            cancel.state = ActionState::Finished;
        }
    }

    /// Hand finished and cancelled actions back to the control side
    fn retire(&mut self) {
        let mut i = 0;
        while i < self.active.len() {
            if !self.active[i].state.is_retired() {
                i += 1;
                continue;
            }
            let action = self.active.swap_remove(i);
            if let Err(action) = self.queue.complete(action) {
                bump(&self.stats.dropped_completions, 1);
                // Deferred to the collector thread
                drop(action);
            }
        }
    }
}

/// Mix the next slice of a buffer into the output
fn play_buffer(action: &mut Action, output: &mut [f32], output_channels: usize) {
    let ActionKind::PlayBuffer { samples } = &action.kind else {
        return;
    };
    let channels = action.channels.len();
    let total = samples.len() / channels;
    let n = (action.end - action.begin).min(total - action.offset);

    for f in 0..n {
        let src = &samples[(action.offset + f) * channels..][..channels];
        let frame = (action.begin + f) * output_channels;
        for (sample, &channel) in src.iter().zip(&action.channels) {
            if let Some(out) = output.get_mut(frame + channel - 1) {
                *out += *sample;
            }
        }
    }

    action.offset += n;
    action.frames_done += n as u64;
    if action.offset == total {
        action.state = ActionState::Finished;
    }
}

/// Mix frames from a ring buffer into the output
fn play_ringbuffer(
    action: &mut Action,
    output: &mut [f32],
    output_channels: usize,
    stats: &EngineStats,
) {
    let ActionKind::PlayRingbuffer { ring } = &action.kind else {
        return;
    };
    let wanted = action.end - action.begin;
    let channel_list = &action.channels;
    let mut frame = action.begin;

    let got = ring.read_with(wanted, |region| {
        for element in region.chunks_exact(channel_list.len() * SAMPLE_SIZE) {
            let base = frame * output_channels;
            for (bytes, &channel) in element.chunks_exact(SAMPLE_SIZE).zip(channel_list) {
                if let Some(out) = output.get_mut(base + channel - 1) {
                    *out += sample_from_bytes(bytes);
                }
            }
            frame += 1;
        }
    });
    action.frames_done += got as u64;

    if got < wanted {
        if ring.is_closed() {
            action.state = ActionState::Finished;
        } else {
            action.xruns += 1;
            bump(&stats.ringbuffer_underruns, 1);
        }
    }
}

/// Copy input channels into a buffer
fn record_buffer(action: &mut Action, input: &[f32], input_channels: usize) {
    let channels = action.channels.len();
    let (begin, end, offset) = (action.begin, action.end, action.offset);
    let ActionKind::RecordBuffer { samples } = &mut action.kind else {
        return;
    };
    let total = samples.len() / channels;
    let n = (end - begin).min(total - offset);

    for f in 0..n {
        let dst = &mut samples[(offset + f) * channels..][..channels];
        let frame = (begin + f) * input_channels;
        for (sample, &channel) in dst.iter_mut().zip(&action.channels) {
            *sample = input.get(frame + channel - 1).copied().unwrap_or(0.0);
        }
    }

    action.offset += n;
    action.frames_done += n as u64;
    if action.offset == total {
        action.state = ActionState::Finished;
    }
}

/// Copy input channels into a ring buffer; frames that don't fit are dropped
fn record_ringbuffer(
    action: &mut Action,
    input: &[f32],
    input_channels: usize,
    stats: &EngineStats,
) {
    let ActionKind::RecordRingbuffer { ring } = &action.kind else {
        return;
    };
    if ring.is_closed() {
        action.state = ActionState::Finished;
        return;
    }

    let wanted = action.end - action.begin;
    let channel_list = &action.channels;
    let mut frame = action.begin;

    let written = ring.write_with(wanted, |region| {
        for element in region.chunks_exact_mut(channel_list.len() * SAMPLE_SIZE) {
            let base = frame * input_channels;
            for (bytes, &channel) in element.chunks_exact_mut(SAMPLE_SIZE).zip(channel_list) {
                let sample = input.get(base + channel - 1).copied().unwrap_or(0.0);
                bytes.copy_from_slice(&sample.to_ne_bytes());
            }
            frame += 1;
        }
    });

    // Recording keeps going; the lost frames are only counted
    let dropped = wanted - written;
    if dropped > 0 {
        action.xruns += 1;
        bump(&stats.dropped_recording_frames, dropped as u64);
    }
    action.frames_done += wanted as u64;
}

#[inline]
fn sample_from_bytes(bytes: &[u8]) -> f32 {
    let mut raw = [0u8; SAMPLE_SIZE];
    raw.copy_from_slice(bytes);
    f32::from_ne_bytes(raw)
}
