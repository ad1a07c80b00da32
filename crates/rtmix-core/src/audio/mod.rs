//! Audio device backend
//!
//! Runs a [`crate::RealtimeEngine`] from CPAL stream callbacks. Three stream
//! kinds are supported:
//!
//! - **Output**: playback only (play actions)
//! - **Input**: capture only (record actions)
//! - **Duplex**: capture and playback in one engine; input reaches the
//!   output callback through a lock-free sample bridge
//!
//! Absolute time is the running frame count of the callback that owns the
//! engine.
//!
//! # Example Usage
//!
//! ```ignore
//! use rtmix_core::audio::{start_audio_system, AudioConfig};
//! use rtmix_core::{MixerConfig, StartTime};
//!
//! let system = start_audio_system(&AudioConfig::output(), &MixerConfig::output(2))?;
//! let now = system.mixer.current_time();
//! system.mixer.play_buffer(samples, &[1, 2], StartTime::At(now + 4800))?;
//! ```

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;

pub use backend::{start_audio_system, AudioHandle, AudioSystemResult};
pub use config::{
    AudioConfig, BufferSize, DeviceId, StreamKind, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE,
    MAX_BUFFER_SIZE,
};
pub use device::{find_device, list_devices, list_input_devices, list_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
