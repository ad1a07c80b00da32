//! Random sine bleeps with linear fades

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Attack fade length in seconds
const ATTACK: f32 = 0.005;
/// Release fade length in seconds
const RELEASE: f32 = 0.1;

const PITCH_RANGE: std::ops::Range<f32> = 40.0..80.0;
const DURATION_RANGE: std::ops::Range<f32> = 0.2..0.6;
const AMPLITUDE_RANGE: std::ops::Range<f32> = 0.05..0.15;

/// One scheduled bleep
pub struct Bleep {
    pub samples: Vec<f32>,
    /// 1-based output channel
    pub channel: usize,
    /// Start offset in frames from the first bleep's reference time
    pub offset: u64,
}

/// Reproducible bleep generator
pub struct BleepGenerator {
    rng: ChaCha8Rng,
    sample_rate: u32,
    channels: usize,
    spread_frames: u64,
}

impl BleepGenerator {
    /// Bleeps for `channels` outputs, starting within `spread_secs` seconds
    pub fn new(seed: u64, sample_rate: u32, channels: usize, spread_secs: f32) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            sample_rate,
            channels: channels.max(1),
            spread_frames: (spread_secs * sample_rate as f32) as u64,
        }
    }

    pub fn next_bleep(&mut self) -> Bleep {
        let duration = self.rng.random_range(DURATION_RANGE);
        let amplitude = self.rng.random_range(AMPLITUDE_RANGE);
        let pitch = self.rng.random_range(PITCH_RANGE);

        Bleep {
            samples: sine(midi_to_hz(pitch), amplitude, duration, self.sample_rate),
            channel: self.rng.random_range(1..=self.channels),
            offset: self.rng.random_range(0..=self.spread_frames),
        }
    }
}

/// Convert a MIDI pitch to a frequency (A4 = 69 = 440 Hz)
fn midi_to_hz(pitch: f32) -> f32 {
    2f32.powf((pitch - 69.0) / 12.0) * 440.0
}

fn sine(frequency: f32, amplitude: f32, duration: f32, sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate as f32;
    let len = (duration * rate) as usize;
    let attack = ((ATTACK * rate) as usize).max(1);
    let release = ((RELEASE * rate) as usize).max(1);

    (0..len)
        .map(|i| {
            let t = i as f32 / rate;
            let fade_in = (i as f32 / attack as f32).min(1.0);
            let fade_out = ((len - 1 - i) as f32 / release as f32).min(1.0);
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin() * fade_in * fade_out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_bleeps() {
        let mut a = BleepGenerator::new(99, 44100, 2, 10.0);
        let mut b = BleepGenerator::new(99, 44100, 2, 10.0);
        for _ in 0..5 {
            let (x, y) = (a.next_bleep(), b.next_bleep());
            assert_eq!(x.samples, y.samples);
            assert_eq!(x.channel, y.channel);
            assert_eq!(x.offset, y.offset);
        }
    }

    #[test]
    fn test_bleep_shape() {
        let mut generator = BleepGenerator::new(1, 48000, 4, 2.0);
        for _ in 0..20 {
            let bleep = generator.next_bleep();
            assert!((1..=4).contains(&bleep.channel));
            assert!(bleep.offset <= 96000);
            assert!(bleep.samples.len() >= 9600 && bleep.samples.len() <= 28800);
            assert_eq!(bleep.samples[0], 0.0);
            assert_eq!(*bleep.samples.last().unwrap(), 0.0);
            assert!(bleep.samples.iter().all(|s| s.abs() <= 0.15));
        }
    }

    #[test]
    fn test_midi_to_hz() {
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-3);
        assert!((midi_to_hz(81.0) - 880.0).abs() < 1e-2);
    }
}
