//! CPAL audio backend
//!
//! Opens the streams for the three stream kinds and moves the
//! [`RealtimeEngine`] into the callback that drives it. The engine is owned
//! by exactly one callback, so no lock is ever taken on the audio thread.
//!
//! # Duplex
//!
//! CPAL has no duplex stream. A duplex engine runs inside the output
//! callback and receives its input from a separate capture stream through a
//! lock-free sample ring:
//!
//! ```text
//!                    ┌───────────────────────┐
//!   Capture device ─►│    Input Stream       │
//!                    │  pushes whole frames  │
//!                    └───────────┬───────────┘
//!                                │
//!                    ┌───────────▼───────────┐
//!                    │  Input Sample Bridge  │  <── rtrb SPSC, 4 buffers deep
//!                    │  (primed with silence)│      full  -> input overflow
//!                    └───────────┬───────────┘      empty -> input underflow
//!                                │
//!                    ┌───────────▼───────────┐
//!                    │    Output Stream      │  <── owns the engine
//!                    │  process(in, out, ..) │
//!                    └───────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig, SupportedBufferSize};

use super::config::{AudioConfig, StreamKind, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
use super::device::open_device;
use super::error::{AudioError, AudioResult};
use crate::config::MixerConfig;
use crate::control::Mixer;
use crate::engine::{BlockStatus, RealtimeEngine};
use crate::error::Direction;

/// Smallest buffer size accepted from the configuration (frames)
const MIN_BUFFER_SIZE: u32 = 16;

/// Bridge depth in device buffers
const BRIDGE_BUFFERS: usize = 4;

/// CPAL stream handle
///
/// Keeps the streams alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    _input_stream: Option<Stream>,
    _output_stream: Option<Stream>,
    sample_rate: u32,
    /// Negotiated buffer size in frames
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

pub(super) struct Started {
    pub handle: CpalAudioHandle,
    pub mixer: Mixer,
}

/// Open and start the streams for `config.stream_kind`
pub(super) fn start(config: &AudioConfig, mixer_config: &MixerConfig) -> AudioResult<Started> {
    match config.stream_kind {
        StreamKind::Output => start_output(config, mixer_config),
        StreamKind::Input => start_input(config, mixer_config),
        StreamKind::Duplex => start_duplex(config, mixer_config),
    }
}

/// Stream errors noticed outside the engine, reported with the next block
#[derive(Default)]
struct XrunFlags {
    output: AtomicBool,
    input: AtomicBool,
}

/// State owned by the callback that runs the engine
struct EngineDriver {
    engine: RealtimeEngine,
    /// Absolute frame of the next block
    time: u64,
    /// Input frames for one sub-block (duplex only)
    input_scratch: Vec<f32>,
    bridge: Option<rtrb::Consumer<f32>>,
    flags: Arc<XrunFlags>,
}

impl EngineDriver {
    fn new(engine: RealtimeEngine, bridge: Option<rtrb::Consumer<f32>>, flags: Arc<XrunFlags>) -> Self {
        let scratch_len = if bridge.is_some() {
            MAX_BUFFER_SIZE * engine.input_channels()
        } else {
            0
        };
        Self {
            engine,
            time: 0,
            input_scratch: vec![0.0; scratch_len],
            bridge,
            flags,
        }
    }

    fn take_status(&self) -> BlockStatus {
        BlockStatus {
            output_underflow: self.flags.output.swap(false, Ordering::Relaxed),
            input_overflow: self.flags.input.swap(false, Ordering::Relaxed),
            ..BlockStatus::default()
        }
    }

    /// Output callback body; device buffers larger than the scratch space
    /// are processed in several sub-blocks
    fn render(&mut self, data: &mut [f32]) {
        let output_channels = self.engine.output_channels();
        let input_channels = self.engine.input_channels();
        let mut status = self.take_status();

        for chunk in data.chunks_mut(MAX_BUFFER_SIZE * output_channels) {
            let frames = chunk.len() / output_channels;
            let input = match self.bridge.as_mut() {
                Some(bridge) => {
                    let input = &mut self.input_scratch[..frames * input_channels];
                    if pull_frames(bridge, input, input_channels) < input.len() {
                        status.input_underflow = true;
                    }
                    &*input
                }
                None => &[][..],
            };
            self.engine.process(input, chunk, frames, self.time, status);
            self.time += frames as u64;
            status = BlockStatus::default();
        }
    }

    /// Input callback body for capture-only streams
    fn capture(&mut self, data: &[f32]) {
        let input_channels = self.engine.input_channels();
        let mut status = self.take_status();

        for chunk in data.chunks(MAX_BUFFER_SIZE * input_channels) {
            let frames = chunk.len() / input_channels;
            self.engine.process(chunk, &mut [], frames, self.time, status);
            self.time += frames as u64;
            status = BlockStatus::default();
        }
    }
}

/// Move whole frames from the bridge into `dest`, zero-filling the rest
///
/// Returns the number of samples read.
fn pull_frames(bridge: &mut rtrb::Consumer<f32>, dest: &mut [f32], channels: usize) -> usize {
    let n = (bridge.slots() / channels * channels).min(dest.len());
    let got = match bridge.read_chunk(n) {
        Ok(chunk) => {
            let (first, second) = chunk.as_slices();
            dest[..first.len()].copy_from_slice(first);
            dest[first.len()..n].copy_from_slice(second);
            chunk.commit_all();
            n
        }
        Err(_) => 0,
    };
    dest[got..].fill(0.0);
    got
}

/// Push as many whole frames of `data` as fit; false if any were dropped
fn push_frames(bridge: &mut rtrb::Producer<f32>, data: &[f32], channels: usize) -> bool {
    let n = (bridge.slots() / channels * channels).min(data.len());
    if let Ok(mut chunk) = bridge.write_chunk(n) {
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&data[..split]);
        second.copy_from_slice(&data[split..n]);
        chunk.commit_all();
    }
    n == data.len()
}

/// A device together with the stream configuration chosen for it
struct OpenedDevice {
    device: cpal::Device,
    stream_config: StreamConfig,
    buffer_size: u32,
}

impl OpenedDevice {
    fn channels(&self) -> usize {
        self.stream_config.channels as usize
    }

    fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate.0
    }
}

fn open(config: &AudioConfig, direction: Direction, channels: usize) -> AudioResult<OpenedDevice> {
    let id = match direction {
        Direction::Output => config.output_device.as_ref(),
        Direction::Input => config.input_device.as_ref(),
    };
    let device = open_device(id, direction)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using {} device: {}", direction, name);

    let (supported, buffer_size) = select_config(&device, direction, channels, config)?;
    if supported.channels() as usize != channels {
        log::info!(
            "Requested {} {} channel(s), device provides {}",
            channels,
            direction,
            supported.channels()
        );
    }

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    Ok(OpenedDevice {
        device,
        stream_config,
        buffer_size,
    })
}

/// Pick an f32 configuration, preferring the requested channel count and
/// sample rate
///
/// Returns (config, buffer size in frames).
fn select_config(
    device: &cpal::Device,
    direction: Direction,
    channels: usize,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Output => device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
        Direction::Input => device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
    };

    // The engine works on f32 only
    let ranges: Vec<_> = ranges
        .into_iter()
        .filter(|r| r.sample_format() == SampleFormat::F32)
        .collect();

    let target_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let wanted = channels.max(1) as u16;
    let has_rate = |r: &&cpal::SupportedStreamConfigRange| {
        target_rate >= r.min_sample_rate().0 && target_rate <= r.max_sample_rate().0
    };

    let best = ranges
        .iter()
        .filter(has_rate)
        .find(|r| r.channels() == wanted)
        .or_else(|| ranges.iter().filter(has_rate).find(|r| r.channels() >= wanted))
        .or_else(|| ranges.iter().find(|r| r.channels() >= wanted))
        .or_else(|| ranges.first())
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!("no f32 {} configuration offered", direction))
        })?;

    let sample_rate = if has_rate(&best) {
        cpal::SampleRate(target_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Device doesn't support {}Hz, falling back to {}Hz",
            target_rate,
            fallback.0
        );
        fallback
    };

    let requested = config
        .buffer_size
        .as_frames()
        .map_or(DEFAULT_BUFFER_SIZE, |frames| {
            frames.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32)
        });
    let buffer_size = match best.buffer_size() {
        SupportedBufferSize::Range { min, max } => requested.clamp(*min, *max),
        SupportedBufferSize::Unknown => requested,
    };
    log::debug!(
        "Selected {} buffer size: {} frames for {:?}",
        direction,
        buffer_size,
        config.buffer_size
    );

    Ok((best.clone().with_sample_rate(sample_rate), buffer_size))
}

fn create_mixer(
    mixer_config: &MixerConfig,
    input_channels: usize,
    output_channels: usize,
) -> AudioResult<(Mixer, RealtimeEngine)> {
    Ok(Mixer::new(MixerConfig {
        input_channels,
        output_channels,
        ..mixer_config.clone()
    })?)
}

fn log_stream(label: &str, opened: &OpenedDevice) {
    let latency_ms = (opened.buffer_size as f32 / opened.sample_rate() as f32) * 1000.0;
    log::info!(
        "{} config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        label,
        opened.channels(),
        opened.sample_rate(),
        opened.buffer_size,
        latency_ms
    );
}

/// Playback-only stream
fn start_output(config: &AudioConfig, mixer_config: &MixerConfig) -> AudioResult<Started> {
    let output = open(config, Direction::Output, mixer_config.output_channels)?;
    log_stream("Output", &output);

    let (mixer, engine) = create_mixer(mixer_config, 0, output.channels())?;
    let flags = Arc::new(XrunFlags::default());
    let driver = EngineDriver::new(engine, None, Arc::clone(&flags));

    let stream = build_output_stream(&output, driver, flags)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    log::info!("Audio stream started (output)");

    Ok(Started {
        handle: CpalAudioHandle {
            _input_stream: None,
            _output_stream: Some(stream),
            sample_rate: output.sample_rate(),
            buffer_size: output.buffer_size,
        },
        mixer,
    })
}

/// Capture-only stream
fn start_input(config: &AudioConfig, mixer_config: &MixerConfig) -> AudioResult<Started> {
    let input = open(config, Direction::Input, mixer_config.input_channels)?;
    log_stream("Input", &input);

    let (mixer, engine) = create_mixer(mixer_config, input.channels(), 0)?;
    let flags = Arc::new(XrunFlags::default());
    let mut driver = EngineDriver::new(engine, None, Arc::clone(&flags));

    let stream = input
        .device
        .build_input_stream(
            &input.stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| driver.capture(data),
            move |err| {
                flags.input.store(true, Ordering::Relaxed);
                log::error!("Input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    log::info!("Audio stream started (input)");

    Ok(Started {
        handle: CpalAudioHandle {
            _input_stream: Some(stream),
            _output_stream: None,
            sample_rate: input.sample_rate(),
            buffer_size: input.buffer_size,
        },
        mixer,
    })
}

/// Capture and playback bridged into one engine
fn start_duplex(config: &AudioConfig, mixer_config: &MixerConfig) -> AudioResult<Started> {
    let input = open(config, Direction::Input, mixer_config.input_channels)?;
    let output = open(config, Direction::Output, mixer_config.output_channels)?;

    if input.sample_rate() != output.sample_rate() {
        return Err(AudioError::SampleRateMismatch {
            input: input.sample_rate(),
            output: output.sample_rate(),
        });
    }
    log_stream("Input", &input);
    log_stream("Output", &output);

    let (mixer, engine) = create_mixer(mixer_config, input.channels(), output.channels())?;
    let input_channels = input.channels();

    let buffer_size = input.buffer_size.max(output.buffer_size) as usize;
    let bridge_capacity = buffer_size * input_channels * BRIDGE_BUFFERS;
    let (mut producer, consumer) = rtrb::RingBuffer::<f32>::new(bridge_capacity);
    // One buffer of silence so the first output callback finds input
    push_frames(&mut producer, &vec![0.0; buffer_size * input_channels], input_channels);
    log::debug!("Input bridge created with capacity {} samples", bridge_capacity);

    let flags = Arc::new(XrunFlags::default());
    let driver = EngineDriver::new(engine, Some(consumer), Arc::clone(&flags));

    let input_flags = Arc::clone(&flags);
    let error_flags = Arc::clone(&flags);
    let input_stream = input
        .device
        .build_input_stream(
            &input.stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                if !push_frames(&mut producer, data, input_channels) {
                    input_flags.input.store(true, Ordering::Relaxed);
                }
            },
            move |err| {
                error_flags.input.store(true, Ordering::Relaxed);
                log::error!("Input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("Input: {}", e)))?;
    let output_stream = build_output_stream(&output, driver, flags)?;

    input_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;
    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Output: {}", e)))?;
    log::info!("Audio streams started (duplex, lock-free bridge)");

    Ok(Started {
        handle: CpalAudioHandle {
            _input_stream: Some(input_stream),
            _output_stream: Some(output_stream),
            sample_rate: output.sample_rate(),
            buffer_size: buffer_size as u32,
        },
        mixer,
    })
}

fn build_output_stream(
    output: &OpenedDevice,
    mut driver: EngineDriver,
    flags: Arc<XrunFlags>,
) -> AudioResult<Stream> {
    output
        .device
        .build_output_stream(
            &output.stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| driver.render(data),
            move |err| {
                flags.output.store(true, Ordering::Relaxed);
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::StartTime;

    #[test]
    fn test_bridge_moves_whole_frames() {
        let (mut producer, mut consumer) = rtrb::RingBuffer::<f32>::new(7);
        // 7 slots hold three stereo frames
        assert!(!push_frames(&mut producer, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], 2));
        assert_eq!(consumer.slots(), 6);

        let mut dest = [9.0; 8];
        assert_eq!(pull_frames(&mut consumer, &mut dest, 2), 6);
        assert_eq!(dest, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_driver_pulls_input_and_flags_shortfall() {
        let (mixer, engine) = Mixer::new(MixerConfig::duplex(1, 1)).unwrap();
        let (mut producer, consumer) = rtrb::RingBuffer::<f32>::new(64);
        let flags = Arc::new(XrunFlags::default());
        let mut driver = EngineDriver::new(engine, Some(consumer), Arc::clone(&flags));

        let id = mixer.record_buffer(4, &[1], StartTime::Immediate).unwrap();
        assert!(push_frames(&mut producer, &[0.1, 0.2], 1));
        flags.output.store(true, Ordering::Relaxed);

        let mut out = [1.0f32; 4];
        driver.render(&mut out);
        assert_eq!(out, [0.0; 4]);

        let stats = mixer.stats();
        assert_eq!(stats.blocks, 1);
        assert_eq!(stats.input_underflows, 1);
        assert_eq!(stats.output_underflows, 1);
        assert_eq!(mixer.current_time(), 4);

        let mut completed = mixer.poll_completed();
        assert_eq!(completed[0].id, id);
        assert_eq!(completed[0].take_recording(), Some(vec![0.1, 0.2, 0.0, 0.0]));
    }

    #[test]
    fn test_driver_splits_large_buffers() {
        let (mixer, engine) = Mixer::new(MixerConfig::output(2)).unwrap();
        let mut driver = EngineDriver::new(engine, None, Arc::new(XrunFlags::default()));

        let mut out = vec![0.0f32; (MAX_BUFFER_SIZE + 100) * 2];
        driver.render(&mut out);
        assert_eq!(mixer.stats().blocks, 2);
        assert_eq!(mixer.current_time(), (MAX_BUFFER_SIZE + 100) as u64);
    }

    #[test]
    fn test_capture_driver_counts_frames() {
        let (mixer, engine) = Mixer::new(MixerConfig::input(2)).unwrap();
        let flags = Arc::new(XrunFlags::default());
        let mut driver = EngineDriver::new(engine, None, Arc::clone(&flags));
        flags.input.store(true, Ordering::Relaxed);

        driver.capture(&[0.0; 256]);
        driver.capture(&[0.0; 256]);
        let stats = mixer.stats();
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.input_overflows, 1);
        assert_eq!(mixer.current_time(), 256);
    }
}
