//! Audio backend error types

use thiserror::Error;

use crate::error::{Direction, MixerError};

/// Errors that can occur while opening or running audio streams
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio {0} devices found")]
    NoDevices(Direction),

    #[error("Failed to get default audio {0} device")]
    NoDefaultDevice(Direction),

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Capture and playback devices of a duplex stream disagree
    #[error("Sample rate mismatch: input={input}Hz, output={output}Hz")]
    SampleRateMismatch { input: u32, output: u32 },

    #[error(transparent)]
    Mixer(#[from] MixerError),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
