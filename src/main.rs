//! pullbridge - plays a test tone through the configured audio backend
//!
//! Usage: `pullbridge [seconds]`

use std::env;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use pb_audio::host::{CpalHost, NullHost, NullHostProbe};
use pb_audio::{AudioHost, AudioOutput, MixerFlags, ToneMixer};
use pb_core::config::{AudioConfig, BackendKind, Config};
use tracing::info;

const TONE_HZ: f32 = 440.0;
const TONE_VOLUME: f32 = 0.25;
const DEFAULT_SECONDS: f32 = 2.0;

/// Interval at which the null backend is driven
const NULL_PERIOD: Duration = Duration::from_millis(10);

fn main() -> Result<()> {
    let config = Config::load().unwrap_or_default();
    pb_core::logging::init(&config);

    let duration = match env::args().nth(1) {
        Some(arg) => {
            let seconds: f32 = arg
                .parse()
                .with_context(|| format!("Invalid duration '{}'", arg))?;
            Duration::try_from_secs_f32(seconds)
                .with_context(|| format!("Invalid duration '{}'", arg))?
        }
        None => Duration::from_secs_f32(DEFAULT_SECONDS),
    };

    info!("Starting pullbridge");

    let mut mixer = ToneMixer::new(TONE_HZ);
    mixer.set_volume(TONE_VOLUME);

    match config.audio.backend {
        BackendKind::Cpal => {
            let host = match &config.audio.host {
                Some(name) => CpalHost::with_host_name(name.clone()),
                None => CpalHost::new(),
            }
            .with_fixed_buffer(config.audio.fixed_device_buffer);

            let _output = start(host, &mut mixer, &config.audio)?;
            thread::sleep(duration);
            // Releases the stream through the hook the backend registered
            mixer.deinit();
        }
        BackendKind::Null => {
            let host = NullHost::new();
            let probe = host.probe();

            let output = start(host, &mut mixer, &config.audio)?;
            drive_null(&output, &probe, duration);
            mixer.deinit();
        }
    }

    info!("Done");
    Ok(())
}

fn mixer_flags(audio: &AudioConfig) -> MixerFlags {
    let mut flags = MixerFlags::empty();
    flags.set(MixerFlags::CLIP_ROUNDOFF, audio.clip_roundoff);
    flags.set(MixerFlags::ENABLE_VISUALIZATION, audio.visualization);
    flags
}

fn start<H: AudioHost + 'static>(
    host: H,
    mixer: &mut ToneMixer,
    audio: &AudioConfig,
) -> Result<AudioOutput<H>> {
    let mut output = AudioOutput::new(host);
    output
        .initialize(
            mixer,
            mixer_flags(audio),
            audio.sample_rate,
            audio.buffer_size,
            audio.channels,
        )
        .context("Failed to initialize audio output")?;

    info!(
        "Playing {} Hz through {} ({} frame buffer)",
        TONE_HZ,
        output.backend_name().unwrap_or_default(),
        mixer.buffer_size()
    );
    Ok(output)
}

/// Stand in for a device thread: pull one period of audio at a time
fn drive_null(output: &AudioOutput<NullHost>, probe: &NullHostProbe, duration: Duration) {
    let Some(spec) = output.active_spec() else {
        return;
    };
    let frames = (spec.sample_rate as usize * NULL_PERIOD.as_millis() as usize) / 1000;
    let bytes = frames * usize::from(spec.channels) * std::mem::size_of::<f32>();

    let started = Instant::now();
    let mut captured = 0usize;
    let mut peak = 0.0f32;
    while started.elapsed() < duration {
        probe.pump(bytes);
        for sample in probe.take_samples() {
            peak = peak.max(sample.abs());
            captured += 1;
        }
        thread::sleep(NULL_PERIOD);
    }

    info!("Null backend captured {} samples, peak {:.3}", captured, peak);
}
