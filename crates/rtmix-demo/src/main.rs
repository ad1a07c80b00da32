//! rtmix bleeps - schedules a burst of random bleeps at absolute times
//!
//! All bleeps are submitted at once, which puts strain on the action queue;
//! rejected submissions are retried after polling completed bleeps, which
//! frees their slots. When everything has played, the engine statistics are
//! printed.
//!
//! ## Command line flags
//!
//! - `--list-devices`: print audio devices and exit
//! - `--device <NAME>`: output device (default: system default)
//! - `--bleeps <N>`, `--seed <N>`, `--spread <SECS>`: what gets scheduled

mod bleeps;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use rtmix_core::audio::{
    list_input_devices, list_output_devices, start_audio_system, BufferSize, DeviceId, StreamKind,
};
use rtmix_core::config::{default_config_path, load_config, save_config};
use rtmix_core::{Completion, MixerError, RtmixConfig, StartTime};

use bleeps::BleepGenerator;

/// How often pending actions are polled
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "rtmix-bleeps", about = "Play random bleeps scheduled at absolute times")]
struct Args {
    /// List input and output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Output device name
    #[arg(long)]
    device: Option<String>,

    /// Host of the output device (e.g. ALSA)
    #[arg(long, requires = "device")]
    host: Option<String>,

    /// Number of bleeps
    #[arg(long, default_value_t = 300)]
    bleeps: usize,

    /// Random seed
    #[arg(long, default_value_t = 99)]
    seed: u64,

    /// Bleeps start within this many seconds
    #[arg(long, default_value_t = 10.0)]
    spread: f32,

    /// Action queue capacity and in-flight bleep limit (power of two)
    #[arg(long, default_value_t = 512)]
    qsize: usize,

    /// Output channels to request
    #[arg(long)]
    channels: Option<usize>,

    /// Sample rate to request
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Buffer size in frames
    #[arg(long)]
    block_size: Option<u32>,

    /// Config file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective config back to the config file
    #[arg(long)]
    save_config: bool,
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    if args.list_devices {
        return list_devices();
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path("rtmix.yaml"));
    let mut config: RtmixConfig = load_config(&config_path);
    apply_args(&mut config, &args);

    if args.save_config {
        save_config(&config, &config_path)?;
    }

    let system = start_audio_system(&config.audio, &config.mixer)
        .context("Failed to start audio output")?;
    let mixer = &system.mixer;
    println!(
        "Playing {} bleeps on {} channel(s) at {} Hz ({} frames, ~{:.1}ms)",
        args.bleeps,
        mixer.output_channels(),
        system.sample_rate,
        system.buffer_size,
        system.latency_ms
    );

    let mut generator = BleepGenerator::new(
        args.seed,
        system.sample_rate,
        mixer.output_channels(),
        args.spread,
    );

    let start_time = mixer.current_time();
    let mut tally = Tally::default();
    let mut retries = 0u64;
    for _ in 0..args.bleeps {
        let bleep = generator.next_bleep();
        let start = StartTime::At(start_time + bleep.offset);
        let samples: std::sync::Arc<[f32]> = bleep.samples.into();

        loop {
            match mixer.play_buffer(samples.clone(), &[bleep.channel], start) {
                Ok(_) => break,
                Err(MixerError::QueueFull { .. }) => {
                    // Polling hands in-flight slots back
                    retries += 1;
                    thread::sleep(Duration::from_millis(1));
                    tally.add(mixer.poll_completed());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    if retries > 0 {
        log::warn!(
            "Submission was rejected {} time(s); consider a larger --qsize",
            retries
        );
    }

    while !mixer.pending_actions().is_empty() {
        thread::sleep(POLL_INTERVAL);
        tally.add(mixer.poll_completed());
    }

    let stats = mixer.stats();
    println!("{} bleeps played, {} started late", tally.completed, tally.late);
    println!(
        "{} buffer underflows in {} processed audio blocks",
        stats.output_underflows, stats.blocks
    );
    log::info!("Engine stats: {}", stats);

    Ok(())
}

/// Completions seen so far
#[derive(Default)]
struct Tally {
    completed: usize,
    late: usize,
}

impl Tally {
    fn add(&mut self, completions: Vec<Completion>) {
        for completion in completions {
            self.completed += 1;
            if let (StartTime::At(requested), Some(actual)) =
                (completion.requested_time, completion.actual_time)
            {
                if actual > requested {
                    self.late += 1;
                    log::debug!("{} started {} frames late", completion.id, actual - requested);
                }
            }
        }
    }
}

fn apply_args(config: &mut RtmixConfig, args: &Args) {
    config.audio.stream_kind = StreamKind::Output;
    config.mixer.input_channels = 0;
    // Every bleep may be in flight at once
    config.mixer.queue_capacity = args.qsize;
    config.mixer.max_active = args.qsize;
    config.mixer.completion_capacity = args.qsize.saturating_mul(2);
    if let Some(channels) = args.channels {
        config.mixer.output_channels = channels;
    }

    if let Some(name) = &args.device {
        config.audio.output_device = Some(match &args.host {
            Some(host) => DeviceId::with_host(name, host),
            None => DeviceId::new(name.as_str()),
        });
    }
    if let Some(rate) = args.sample_rate {
        config.audio.sample_rate = Some(rate);
    }
    if let Some(frames) = args.block_size {
        config.audio.buffer_size = BufferSize::Fixed(frames);
    }
}

fn list_devices() -> Result<()> {
    for (label, devices) in [
        ("Output", list_output_devices()),
        ("Input", list_input_devices()),
    ] {
        println!("{} devices:", label);
        match devices {
            Ok(devices) => {
                for device in devices {
                    println!("  {} rates: {:?}", device, device.sample_rates);
                }
            }
            Err(e) => println!("  ({})", e),
        }
    }
    Ok(())
}
