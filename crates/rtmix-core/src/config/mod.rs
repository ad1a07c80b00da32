//! Configuration for the engine and the audio backend
//!
//! - Generic YAML config loading/saving
//! - [`MixerConfig`]: channel counts and queue capacities of the engine
//! - [`RtmixConfig`]: engine + backend settings stored together in one file
//!
//! # Usage
//!
//! ```ignore
//! use rtmix_core::config::{default_config_path, load_config, RtmixConfig};
//!
//! let config: RtmixConfig = load_config(&default_config_path("rtmix.yaml"));
//! config.mixer.validate()?;
//! ```

mod io;
mod mixer;
mod paths;

pub use io::{load_config, save_config};
pub use mixer::{MixerConfig, RtmixConfig, DEFAULT_COMPLETION_CAPACITY, DEFAULT_MAX_ACTIVE, DEFAULT_QUEUE_CAPACITY};
pub use paths::{default_config_dir, default_config_path};
