//! Audio system entry point
//!
//! Opens the streams described by an [`AudioConfig`], creates the engine
//! with the channel counts the devices actually provide and hands the
//! engine to the callback that drives it.

use std::sync::Arc;

use super::config::AudioConfig;
use super::cpal_backend::{self, CpalAudioHandle};
use super::error::AudioResult;
use crate::config::MixerConfig;
use crate::control::Mixer;

/// Result of starting the audio system
pub struct AudioSystemResult {
    /// Keeps the streams alive (drop to stop audio)
    pub handle: AudioHandle,
    /// Control handle of the engine running inside the callback
    pub mixer: Arc<Mixer>,
    pub sample_rate: u32,
    /// Negotiated buffer size in frames
    pub buffer_size: u32,
    /// One-way latency of one buffer
    pub latency_ms: f32,
}

/// Handle to the active audio streams
///
/// Dropping it stops the streams and releases the engine.
pub struct AudioHandle {
    inner: CpalAudioHandle,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    pub fn buffer_size(&self) -> u32 {
        self.inner.buffer_size()
    }

    pub fn latency_ms(&self) -> f32 {
        self.inner.latency_ms()
    }
}

/// Start the audio system
///
/// The channel counts in `mixer_config` are requests: the engine is created
/// with whatever counts the selected devices provide for the directions the
/// stream kind opens (0 for the other direction). Queue settings are used
/// as given.
pub fn start_audio_system(
    config: &AudioConfig,
    mixer_config: &MixerConfig,
) -> AudioResult<AudioSystemResult> {
    mixer_config.validate()?;

    let started = cpal_backend::start(config, mixer_config)?;
    let latency_ms = started.handle.latency_ms();

    Ok(AudioSystemResult {
        sample_rate: started.handle.sample_rate(),
        buffer_size: started.handle.buffer_size(),
        latency_ms,
        handle: AudioHandle {
            inner: started.handle,
        },
        mixer: Arc::new(started.mixer),
    })
}
