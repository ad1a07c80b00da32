//! Engine settings

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::error::{check_power_of_two, MixerError, MixerResult};

/// Default number of slots in the submission queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default number of slots in the completion queue
pub const DEFAULT_COMPLETION_CAPACITY: usize = 512;

/// Default number of play/record actions in flight at once
pub const DEFAULT_MAX_ACTIVE: usize = 256;

/// Channel layout and queue sizes of a [`crate::Mixer`]
///
/// All capacities are fixed when the engine is created; nothing grows while
/// the stream runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Input channels delivered to the callback (0 for output-only streams)
    pub input_channels: usize,
    /// Output channels produced by the callback (0 for input-only streams)
    pub output_channels: usize,
    /// Submission queue slots (power of two)
    pub queue_capacity: usize,
    /// Completion queue slots (power of two, at least `2 * max_active`)
    pub completion_capacity: usize,
    /// Play/record actions submitted but not yet polled; cancels get a
    /// separate budget of the same size
    pub max_active: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            input_channels: 0,
            output_channels: 2,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            completion_capacity: DEFAULT_COMPLETION_CAPACITY,
            max_active: DEFAULT_MAX_ACTIVE,
        }
    }
}

impl MixerConfig {
    /// Output-only layout
    pub fn output(channels: usize) -> Self {
        Self {
            output_channels: channels,
            ..Self::default()
        }
    }

    /// Input-only layout
    pub fn input(channels: usize) -> Self {
        Self {
            input_channels: channels,
            output_channels: 0,
            ..Self::default()
        }
    }

    /// Full-duplex layout
    pub fn duplex(input_channels: usize, output_channels: usize) -> Self {
        Self {
            input_channels,
            output_channels,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> MixerResult<()> {
        if self.input_channels == 0 && self.output_channels == 0 {
            return Err(MixerError::InvalidConfig(
                "stream needs at least one input or output channel".to_string(),
            ));
        }
        if self.max_active == 0 {
            return Err(MixerError::InvalidConfig(
                "max_active must be at least 1".to_string(),
            ));
        }
        check_power_of_two(self.queue_capacity)?;
        check_power_of_two(self.completion_capacity)?;
        if self.completion_capacity < self.max_in_flight() {
            return Err(MixerError::InvalidConfig(format!(
                "completion_capacity {} is smaller than 2 * max_active ({})",
                self.completion_capacity,
                self.max_in_flight()
            )));
        }
        Ok(())
    }

    /// Most actions the callback can hold at once (both admission budgets)
    pub fn max_in_flight(&self) -> usize {
        self.max_active.saturating_mul(2)
    }
}

/// Everything stored in `rtmix.yaml`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RtmixConfig {
    pub mixer: MixerConfig,
    pub audio: AudioConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_stereo_output() {
        let config = MixerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_channels, 2);
        assert_eq!(config.input_channels, 0);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert!(matches!(
            MixerConfig::duplex(0, 0).validate(),
            Err(MixerError::InvalidConfig(_))
        ));
        assert!(matches!(
            MixerConfig {
                max_active: 0,
                ..MixerConfig::default()
            }
            .validate(),
            Err(MixerError::InvalidConfig(_))
        ));
        assert_eq!(
            MixerConfig {
                queue_capacity: 100,
                ..MixerConfig::default()
            }
            .validate(),
            Err(MixerError::InvalidCapacity { capacity: 100 })
        );
        assert!(matches!(
            MixerConfig {
                completion_capacity: 256,
                max_active: 256,
                ..MixerConfig::default()
            }
            .validate(),
            Err(MixerError::InvalidConfig(_))
        ));
        assert!(MixerConfig {
            completion_capacity: 2,
            max_active: 1,
            ..MixerConfig::default()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_layouts() {
        assert_eq!(MixerConfig::input(2).output_channels, 0);
        assert_eq!(MixerConfig::duplex(1, 2).input_channels, 1);
        assert_eq!(MixerConfig::output(8).output_channels, 8);
    }
}
