//! Audio backend configuration
//!
//! Stream direction, device selection, buffer size and sample rate. The
//! channel layout handed to the engine lives in [`crate::MixerConfig`].

use serde::{Deserialize, Serialize};

/// Largest block the backend hands to the engine in one call (frames)
///
/// Duplex scratch buffers are pre-allocated at this size; larger device
/// buffers are processed in several sub-blocks.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when a fixed size is requested without a value (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Sample rate used when neither the config nor the device prefers one
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Which directions the stream opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamKind {
    /// Playback only; record actions are rejected
    #[default]
    Output,
    /// Capture only; play actions are rejected
    Input,
    /// Capture and playback driven by one engine
    Duplex,
}

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose
    #[default]
    Default,
    /// Request a specific size in frames (the system may adjust it)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames, or None for the system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }
}

/// Audio device identifier
///
/// Carries the host backend (ALSA, CoreAudio, WASAPI...) next to the device
/// name so that devices of a non-default host can be selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Host identifier; None selects the default host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub stream_kind: StreamKind,
    /// Playback device (None = system default)
    pub output_device: Option<DeviceId>,
    /// Capture device (None = system default)
    pub input_device: Option<DeviceId>,
    pub buffer_size: BufferSize,
    /// Preferred sample rate (None = device default)
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    pub fn output() -> Self {
        Self::default()
    }

    pub fn input() -> Self {
        Self {
            stream_kind: StreamKind::Input,
            ..Default::default()
        }
    }

    pub fn duplex() -> Self {
        Self {
            stream_kind: StreamKind::Duplex,
            ..Default::default()
        }
    }

    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    pub fn with_input_device(mut self, device: DeviceId) -> Self {
        self.input_device = Some(device);
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}
