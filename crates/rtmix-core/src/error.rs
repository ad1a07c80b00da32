//! Control-side error types
//!
//! Only conditions that can be checked before an action reaches the
//! realtime thread are errors. Faults inside the audio callback are
//! recorded in [`crate::engine::EngineStats`] instead.

use thiserror::Error;

/// Direction of a channel list (used in error messages)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Errors returned by the control API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MixerError {
    /// Capacity is not a power of two (never silently rounded)
    #[error("Invalid capacity {capacity}: must be a non-zero power of two")]
    InvalidCapacity { capacity: usize },

    /// Inbound submission queue is full, or too many actions are in flight
    #[error("Action queue is full (capacity {capacity}); poll completions and retry, or increase queue_capacity/max_active")]
    QueueFull { capacity: usize },

    /// Channel index outside `1..=available`
    #[error("Channel {channel} out of range: stream has {available} {direction} channel(s)")]
    ChannelOutOfRange {
        channel: usize,
        available: usize,
        direction: Direction,
    },

    /// Action needs at least one channel
    #[error("Channel list is empty")]
    EmptyChannelList,

    /// Buffer does not hold a whole number of frames
    #[error("Buffer of {len} samples is not a multiple of {channels} channel(s)")]
    InvalidBufferLength { len: usize, channels: usize },

    /// Ring buffer element is not exactly one frame of the action's channels
    #[error("Ring buffer element size {element_size} bytes, expected {expected} bytes per frame")]
    ElementSizeMismatch { element_size: usize, expected: usize },

    /// Configuration value rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for control API operations
pub type MixerResult<T> = Result<T, MixerError>;

/// Check that `capacity` is a power of two
pub(crate) fn check_power_of_two(capacity: usize) -> MixerResult<()> {
    if capacity.is_power_of_two() {
        Ok(())
    } else {
        Err(MixerError::InvalidCapacity { capacity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two_check() {
        assert!(check_power_of_two(1).is_ok());
        assert!(check_power_of_two(512).is_ok());
        assert_eq!(
            check_power_of_two(0),
            Err(MixerError::InvalidCapacity { capacity: 0 })
        );
        assert_eq!(
            check_power_of_two(100),
            Err(MixerError::InvalidCapacity { capacity: 100 })
        );
    }

    #[test]
    fn test_error_messages() {
        let err = MixerError::ChannelOutOfRange {
            channel: 3,
            available: 2,
            direction: Direction::Output,
        };
        assert_eq!(
            err.to_string(),
            "Channel 3 out of range: stream has 2 output channel(s)"
        );
    }
}
