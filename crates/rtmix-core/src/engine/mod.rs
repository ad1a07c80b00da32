//! Realtime engine - action queue, callback processing, statistics
//!
//! The engine is split in two halves created together by [`crate::Mixer::new`]:
//! - [`crate::Mixer`]: control-thread handle (submit, cancel, poll, stats)
//! - [`RealtimeEngine`]: owned by the audio callback, processes one block per call
//!
//! They share nothing but two lock-free queues and the atomic
//! counters in [`EngineStats`].

mod callback;
pub mod gc;
mod queue;
mod stats;

pub use callback::{BlockStatus, RealtimeEngine};
pub use queue::ActionQueue;
pub use stats::{EngineStats, StatsSnapshot};

pub(crate) use queue::action_queue;
