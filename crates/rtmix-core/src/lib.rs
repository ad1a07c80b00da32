//! rtmix core - realtime audio mixing and recording engine
//!
//! Control threads schedule timed [`Action`]s (play or record a buffer, play
//! from or record into a [`RingBuffer`], cancel) through a [`Mixer`]; the
//! [`RealtimeEngine`] executes them sample-accurately inside the audio
//! callback without locking, allocating or freeing.

pub mod action;
pub mod audio;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod ringbuffer;

pub use action::{Action, ActionId, ActionState, ActionType, Completion, StartTime};
pub use config::{MixerConfig, RtmixConfig};
pub use control::Mixer;
pub use engine::{BlockStatus, EngineStats, RealtimeEngine, StatsSnapshot};
pub use error::{Direction, MixerError, MixerResult};
pub use ringbuffer::RingBuffer;
