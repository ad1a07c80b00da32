//! Control-thread API
//!
//! A [`Mixer`] is the handle non-realtime code uses to schedule actions and
//! observe the engine. It is `Send + Sync`; share it through an `Arc` to
//! submit from several threads. The matching [`RealtimeEngine`] goes to the
//! audio callback.

use std::sync::{Arc, Mutex, PoisonError};

use crate::action::{Action, ActionId, Completion, StartTime};
use crate::config::MixerConfig;
use crate::engine::{action_queue, ActionQueue, EngineStats, RealtimeEngine, StatsSnapshot};
use crate::error::MixerResult;
use crate::ringbuffer::RingBuffer;

/// Control handle of a running engine
pub struct Mixer {
    config: MixerConfig,
    queue: ActionQueue,
    stats: Arc<EngineStats>,
    /// Counter values at the last `fetch_and_reset_stats`
    stats_baseline: Mutex<StatsSnapshot>,
}

impl Mixer {
    /// Create a control handle and the realtime engine it drives
    ///
    /// All queues and the active set are allocated here; the engine does
    /// not allocate afterwards.
    pub fn new(config: MixerConfig) -> MixerResult<(Self, RealtimeEngine)> {
        config.validate()?;

        let (queue, realtime_queue) = action_queue(&config)?;
        let stats = Arc::new(EngineStats::new());
        let engine = RealtimeEngine::new(
            realtime_queue,
            Arc::clone(&stats),
            config.input_channels,
            config.output_channels,
            config.max_in_flight(),
        );

        log::info!(
            "Mixer created: {} in / {} out, queue {}, completions {}, max active {}",
            config.input_channels,
            config.output_channels,
            config.queue_capacity,
            config.completion_capacity,
            config.max_active
        );

        Ok((
            Self {
                config,
                queue,
                stats,
                stats_baseline: Mutex::new(StatsSnapshot::default()),
            },
            engine,
        ))
    }

    /// Validate and enqueue an action
    ///
    /// Fails with `QueueFull` when the audio callback hasn't drained the
    /// submission queue yet, or when `max_active` actions of the same kind
    /// (play/record, or cancel) have not been returned by
    /// [`Mixer::poll_completed`]. Nothing is enqueued in that case.
    pub fn submit(&self, action: Action) -> MixerResult<ActionId> {
        action.validate(self.config.input_channels, self.config.output_channels)?;
        let action_type = action.action_type();
        let id = self.queue.submit(action)?;
        log::debug!("Submitted {:?} {}", action_type, id);
        Ok(id)
    }

    /// Play interleaved `samples` on `channels`
    pub fn play_buffer(
        &self,
        samples: impl Into<Arc<[f32]>>,
        channels: &[usize],
        start: StartTime,
    ) -> MixerResult<ActionId> {
        self.submit(Action::play_buffer(samples, channels, start))
    }

    /// Record `frames` frames from `channels`; the data arrives with the completion
    pub fn record_buffer(
        &self,
        frames: usize,
        channels: &[usize],
        start: StartTime,
    ) -> MixerResult<ActionId> {
        self.submit(Action::record_buffer(frames, channels, start))
    }

    /// Play frames written to `ring` until it is closed and drained
    pub fn play_ringbuffer(
        &self,
        ring: Arc<RingBuffer>,
        channels: &[usize],
        start: StartTime,
    ) -> MixerResult<ActionId> {
        self.submit(Action::play_ringbuffer(ring, channels, start))
    }

    /// Record into `ring` until the reader closes it
    pub fn record_ringbuffer(
        &self,
        ring: Arc<RingBuffer>,
        channels: &[usize],
        start: StartTime,
    ) -> MixerResult<ActionId> {
        self.submit(Action::record_ringbuffer(ring, channels, start))
    }

    /// Stop `target` in the next callback
    pub fn cancel(&self, target: ActionId) -> MixerResult<ActionId> {
        self.cancel_at(target, StartTime::Immediate)
    }

    /// Stop `target` at an absolute frame
    ///
    /// Cancelling an action that already retired has no effect; the cancel
    /// itself completes with `cancel_target == Some((target, false))`.
    pub fn cancel_at(&self, target: ActionId, start: StartTime) -> MixerResult<ActionId> {
        self.submit(Action::cancel(target, start))
    }

    /// Drain retired actions (non-blocking)
    pub fn poll_completed(&self) -> Vec<Completion> {
        self.queue.poll_completed()
    }

    /// Ids submitted but not yet returned by [`Mixer::poll_completed`]
    pub fn pending_actions(&self) -> Vec<ActionId> {
        self.queue.pending_actions()
    }

    pub fn is_pending(&self, id: ActionId) -> bool {
        self.queue.is_pending(id)
    }

    /// Absolute frame at which the next callback block starts
    pub fn current_time(&self) -> u64 {
        self.stats.time()
    }

    /// Counters accumulated since the last [`Mixer::fetch_and_reset_stats`]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot().since(&self.baseline())
    }

    /// Return the counters and start counting from zero again
    pub fn fetch_and_reset_stats(&self) -> StatsSnapshot {
        let current = self.stats.snapshot();
        let mut baseline = self.baseline();
        let delta = current.since(&baseline);
        *baseline = current;
        delta
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn input_channels(&self) -> usize {
        self.config.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.config.output_channels
    }

    fn baseline(&self) -> std::sync::MutexGuard<'_, StatsSnapshot> {
        self.stats_baseline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
