//! Scheduled engine operations
//!
//! An [`Action`] describes one timed operation executed inside the audio
//! callback: play from a buffer, record into a buffer, play from or record
//! into a [`RingBuffer`], or cancel another action. Actions move from the
//! control thread to the realtime thread and back again once retired:
//!
//! ```text
//! Queued ──(start time reached)──► Active ──(data exhausted / ring closed)──► Finished
//!    │                               │
//!    └────────(matching Cancel)──────┴───────────────────────────────────────► Cancelled
//! ```
//!
//! Channel lists are 1-based and name one engine channel per interleaved
//! channel of the action's data, so `[2]` plays a mono buffer on the second
//! output and `[1, 2]` plays an interleaved stereo buffer on the first two.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Direction, MixerError, MixerResult};
use crate::ringbuffer::RingBuffer;

/// Bytes per sample; all sample data is 32-bit float
pub const SAMPLE_SIZE: usize = std::mem::size_of::<f32>();

/// Unique action identifier, assigned on submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ActionId(pub u64);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// When an action should start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StartTime {
    /// At the beginning of the next callback
    #[default]
    Immediate,
    /// At an absolute frame (frames since stream start)
    ///
    /// Times in the past start at the beginning of the next callback.
    At(u64),
}

impl StartTime {
    /// Offset inside the block `[time, time + frames)` at which this start
    /// falls, or `None` if it lies in a later block
    #[inline]
    pub fn offset_in_block(self, time: u64, frames: usize) -> Option<usize> {
        match self {
            StartTime::Immediate => Some(0),
            StartTime::At(at) if at <= time => Some(0),
            StartTime::At(at) => {
                let offset = at - time;
                (offset < frames as u64).then_some(offset as usize)
            }
        }
    }
}

/// Lifecycle state of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionState {
    /// Submitted, start time not reached yet
    Queued,
    /// Being processed by the audio callback
    Active,
    /// Ran to completion
    Finished,
    /// Stopped by a cancel action
    Cancelled,
}

impl ActionState {
    /// Whether the action has left the realtime thread's responsibility
    #[inline]
    pub fn is_retired(self) -> bool {
        matches!(self, ActionState::Finished | ActionState::Cancelled)
    }
}

/// Kind of an action, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    PlayBuffer,
    RecordBuffer,
    PlayRingbuffer,
    RecordRingbuffer,
    Cancel,
}

/// Payload of an action
pub(crate) enum ActionKind {
    /// Interleaved samples mixed into the output
    PlayBuffer { samples: Arc<[f32]> },
    /// Interleaved samples filled from the input
    RecordBuffer { samples: Vec<f32> },
    /// Frames read from a ring buffer and mixed into the output
    PlayRingbuffer { ring: Arc<RingBuffer> },
    /// Input frames written into a ring buffer
    RecordRingbuffer { ring: Arc<RingBuffer> },
    /// Stops `target`; `applied` records whether the target was still around
    Cancel { target: ActionId, applied: bool },
}

/// One scheduled operation
pub struct Action {
    pub(crate) id: ActionId,
    pub(crate) kind: ActionKind,
    pub(crate) channels: Vec<usize>,
    pub(crate) start: StartTime,
    pub(crate) state: ActionState,
    /// Progress in frames (buffer actions: read/write cursor)
    pub(crate) offset: usize,
    pub(crate) frames_done: u64,
    pub(crate) actual_time: Option<u64>,
    pub(crate) xruns: u32,
    /// Frames of the current block this action works on
    pub(crate) begin: usize,
    pub(crate) end: usize,
    /// Set when a cancel cut the current block short
    pub(crate) cancel_requested: bool,
}

impl Action {
    fn new(kind: ActionKind, channels: &[usize], start: StartTime) -> Self {
        Self {
            id: ActionId::default(),
            kind,
            channels: channels.to_vec(),
            start,
            state: ActionState::Queued,
            offset: 0,
            frames_done: 0,
            actual_time: None,
            xruns: 0,
            begin: 0,
            end: 0,
            cancel_requested: false,
        }
    }

    /// Play interleaved `samples` on `channels`
    pub fn play_buffer(samples: impl Into<Arc<[f32]>>, channels: &[usize], start: StartTime) -> Self {
        Self::new(
            ActionKind::PlayBuffer {
                samples: samples.into(),
            },
            channels,
            start,
        )
    }

    /// Record `frames` frames from `channels`
    pub fn record_buffer(frames: usize, channels: &[usize], start: StartTime) -> Self {
        Self::record_into(vec![0.0; frames * channels.len()], channels, start)
    }

    /// Record into an existing interleaved buffer, overwriting its contents
    pub fn record_into(samples: Vec<f32>, channels: &[usize], start: StartTime) -> Self {
        Self::new(ActionKind::RecordBuffer { samples }, channels, start)
    }

    /// Play frames written to `ring` by another thread
    pub fn play_ringbuffer(ring: Arc<RingBuffer>, channels: &[usize], start: StartTime) -> Self {
        Self::new(ActionKind::PlayRingbuffer { ring }, channels, start)
    }

    /// Record frames into `ring` for another thread to read
    pub fn record_ringbuffer(ring: Arc<RingBuffer>, channels: &[usize], start: StartTime) -> Self {
        Self::new(ActionKind::RecordRingbuffer { ring }, channels, start)
    }

    /// Cancel `target` at `start`
    pub fn cancel(target: ActionId, start: StartTime) -> Self {
        Self::new(
            ActionKind::Cancel {
                target,
                applied: false,
            },
            &[],
            start,
        )
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn action_type(&self) -> ActionType {
        match self.kind {
            ActionKind::PlayBuffer { .. } => ActionType::PlayBuffer,
            ActionKind::RecordBuffer { .. } => ActionType::RecordBuffer,
            ActionKind::PlayRingbuffer { .. } => ActionType::PlayRingbuffer,
            ActionKind::RecordRingbuffer { .. } => ActionType::RecordRingbuffer,
            ActionKind::Cancel { .. } => ActionType::Cancel,
        }
    }

    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    pub fn start(&self) -> StartTime {
        self.start
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    /// Total frames of a buffer action (`None` for ring-buffer and cancel actions)
    pub fn total_frames(&self) -> Option<usize> {
        let channels = self.channels.len().max(1);
        match &self.kind {
            ActionKind::PlayBuffer { samples } => Some(samples.len() / channels),
            ActionKind::RecordBuffer { samples } => Some(samples.len() / channels),
            _ => None,
        }
    }

    /// Check the action against a stream's channel counts
    ///
    /// Runs on the control thread so that nothing invalid reaches the
    /// realtime path.
    pub fn validate(&self, input_channels: usize, output_channels: usize) -> MixerResult<()> {
        let (direction, available) = match self.kind {
            ActionKind::Cancel { .. } => return Ok(()),
            ActionKind::PlayBuffer { .. } | ActionKind::PlayRingbuffer { .. } => {
                (Direction::Output, output_channels)
            }
            ActionKind::RecordBuffer { .. } | ActionKind::RecordRingbuffer { .. } => {
                (Direction::Input, input_channels)
            }
        };

        if self.channels.is_empty() {
            return Err(MixerError::EmptyChannelList);
        }
        if let Some(&channel) = self
            .channels
            .iter()
            .find(|&&c| c == 0 || c > available)
        {
            return Err(MixerError::ChannelOutOfRange {
                channel,
                available,
                direction,
            });
        }

        let channels = self.channels.len();
        match &self.kind {
            ActionKind::PlayBuffer { samples } if samples.len() % channels != 0 => {
                Err(MixerError::InvalidBufferLength {
                    len: samples.len(),
                    channels,
                })
            }
            ActionKind::RecordBuffer { samples } if samples.len() % channels != 0 => {
                Err(MixerError::InvalidBufferLength {
                    len: samples.len(),
                    channels,
                })
            }
            ActionKind::PlayRingbuffer { ring } | ActionKind::RecordRingbuffer { ring }
                if ring.element_size() != channels * SAMPLE_SIZE =>
            {
                Err(MixerError::ElementSizeMismatch {
                    element_size: ring.element_size(),
                    expected: channels * SAMPLE_SIZE,
                })
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("type", &self.action_type())
            .field("channels", &self.channels)
            .field("start", &self.start)
            .field("state", &self.state)
            .field("frames_done", &self.frames_done)
            .finish()
    }
}

/// A retired action as reported to the control thread
#[derive(Debug)]
pub struct Completion {
    pub id: ActionId,
    pub action_type: ActionType,
    /// `Finished` or `Cancelled`
    pub state: ActionState,
    pub requested_time: StartTime,
    /// Frame at which the action became active (or a cancel took effect)
    pub actual_time: Option<u64>,
    /// Frames played or recorded (including dropped recording frames)
    pub frames: u64,
    /// Ring-buffer underruns/overruns seen by this action
    pub xruns: u32,
    /// For cancel actions: the target and whether it was still pending
    pub cancel_target: Option<(ActionId, bool)>,
    recording: Option<Vec<f32>>,
}

impl Completion {
    /// Build a report, moving a recorded buffer out of the action
    pub(crate) fn from_action(action: &mut Action) -> Self {
        let (recording, cancel_target) = match &mut action.kind {
            ActionKind::RecordBuffer { samples } => (Some(std::mem::take(samples)), None),
            ActionKind::Cancel { target, applied } => (None, Some((*target, *applied))),
            _ => (None, None),
        };
        Self {
            id: action.id,
            action_type: action.action_type(),
            state: action.state,
            requested_time: action.start,
            actual_time: action.actual_time,
            frames: action.frames_done,
            xruns: action.xruns,
            cancel_target,
            recording,
        }
    }

    /// Take the samples of a finished `RecordBuffer` action
    ///
    /// The buffer has its full length; a cancelled recording holds
    /// `frames * channels` recorded samples followed by zeros.
    pub fn take_recording(&mut self) -> Option<Vec<f32>> {
        self.recording.take()
    }
}
