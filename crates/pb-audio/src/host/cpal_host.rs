//! cpal audio host
//!
//! Opens the default output device of a cpal host. The device picks the
//! closest configuration it supports for the requested sample format, so
//! the granted rate and channel count can differ from the request. Samples
//! pushed by the stream callback are converted to the device's sample type
//! on the way out; any part of the device buffer left unfilled is silence.

use std::collections::HashMap;
use std::mem::size_of;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, SupportedStreamConfigRange};
use tracing::{error, info};

use super::{decode_f32, AudioHost, DeviceId, HostError, HostResult, StreamCallback, StreamSink};
use crate::spec::{AudioSpec, SampleFormat};

/// cpal-backed native host
pub struct CpalHost {
    /// Host name to resolve at init; None = platform default
    requested: Option<String>,
    host: Option<cpal::Host>,
    name: String,
    /// Fixed device buffer in frames
    fixed_buffer: Option<u32>,
    devices: HashMap<DeviceId, String>,
    next_device: u32,
}

/// A paused or running cpal output stream
pub struct CpalStream {
    stream: cpal::Stream,
    device: DeviceId,
    source: AudioSpec,
    granted: AudioSpec,
}

impl CpalHost {
    /// Host using the platform default cpal backend
    pub fn new() -> Self {
        Self {
            requested: None,
            host: None,
            name: "cpal".to_string(),
            fixed_buffer: None,
            devices: HashMap::new(),
            next_device: 0,
        }
    }

    /// Host using a named cpal backend (e.g. "ALSA", "JACK"), matched
    /// case-insensitively
    pub fn with_host_name(name: impl Into<String>) -> Self {
        Self {
            requested: Some(name.into()),
            ..Self::new()
        }
    }

    /// Ask the device for a fixed buffer size, in frames
    pub fn with_fixed_buffer(mut self, frames: Option<u32>) -> Self {
        self.fixed_buffer = frames;
        self
    }

    fn register_device(&mut self, name: String) -> HostResult<DeviceId> {
        self.next_device += 1;
        let id = DeviceId::new(self.next_device).ok_or(HostError::NoDevice)?;
        self.devices.insert(id, name);
        Ok(id)
    }

    /// A stream owns its device: dropping the stream releases it too
    fn release_device(&mut self, device: DeviceId) -> Option<String> {
        self.devices.remove(&device)
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_host(name: Option<&str>) -> HostResult<cpal::Host> {
    let Some(name) = name else {
        return Ok(cpal::default_host());
    };
    let id = cpal::available_hosts()
        .into_iter()
        .find(|id| id.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| HostError::Unavailable(format!("no audio host named '{}'", name)))?;
    cpal::host_from_id(id).map_err(|e| HostError::Unavailable(e.to_string()))
}

fn native_format(format: SampleFormat) -> cpal::SampleFormat {
    match format {
        SampleFormat::F32 => cpal::SampleFormat::F32,
        SampleFormat::S16 => cpal::SampleFormat::I16,
    }
}

/// Pick (channels, sample rate) for `desired` among the device's ranges.
///
/// Only ranges in the desired sample format qualify. The exact channel
/// count wins, then the nearest; among those, a range containing the rate
/// wins, otherwise the rate is clamped into the closest range.
pub fn select_config(
    ranges: &[SupportedStreamConfigRange],
    desired: &AudioSpec,
) -> HostResult<(u16, u32)> {
    let wanted = native_format(desired.format);
    let rate_distance = |range: &SupportedStreamConfigRange| {
        let (min, max) = (range.min_sample_rate().0, range.max_sample_rate().0);
        if desired.sample_rate < min {
            min - desired.sample_rate
        } else {
            desired.sample_rate.saturating_sub(max)
        }
    };

    let best = ranges
        .iter()
        .filter(|range| range.sample_format() == wanted)
        .min_by_key(|range| {
            (
                range.channels().abs_diff(desired.channels),
                rate_distance(range),
            )
        })
        .ok_or(HostError::UnsupportedFormat(desired.format))?;

    let rate = desired
        .sample_rate
        .clamp(best.min_sample_rate().0, best.max_sample_rate().0);
    Ok((best.channels(), rate))
}

/// Input side of a cpal stream during one data callback
struct DeviceSink<'a, T> {
    out: &'a mut [T],
    written: usize,
}

impl<T: Sample> DeviceSink<'_, T> {
    fn finish(self) {
        self.out[self.written..].fill(T::EQUILIBRIUM);
    }
}

impl<T: Sample + FromSample<f32>> StreamSink for DeviceSink<'_, T> {
    fn put_data(&mut self, bytes: &[u8]) -> HostResult<()> {
        let offered = bytes.len() / size_of::<f32>();
        let mut count = 0;
        for (slot, sample) in self.out[self.written..].iter_mut().zip(decode_f32(bytes)) {
            *slot = T::from_sample(sample);
            count += 1;
        }
        self.written += count;

        if count < offered {
            return Err(HostError::Overflow {
                capacity: count,
                offered,
            });
        }
        Ok(())
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: StreamCallback,
) -> HostResult<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // The stream's input side always takes f32
                let needed = data.len() * size_of::<f32>();
                let mut sink = DeviceSink {
                    out: data,
                    written: 0,
                };
                callback(&mut sink, needed, needed);
                sink.finish();
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| HostError::StreamBuild(e.to_string()))
}

impl AudioHost for CpalHost {
    type Stream = CpalStream;

    fn name(&self) -> &str {
        &self.name
    }

    fn was_init(&self) -> bool {
        self.host.is_some()
    }

    fn init_subsystem(&mut self) -> HostResult<()> {
        let host = resolve_host(self.requested.as_deref())?;
        self.name = format!("cpal ({})", host.id().name());
        info!("Audio host initialized: {}", self.name);
        self.host = Some(host);
        Ok(())
    }

    fn open_stream(
        &mut self,
        desired: &AudioSpec,
        callback: StreamCallback,
    ) -> HostResult<CpalStream> {
        let host = self.host.as_ref().ok_or(HostError::NotInitialized)?;
        if desired.sample_rate == 0 || desired.channels == 0 {
            return Err(HostError::InvalidSpec {
                sample_rate: desired.sample_rate,
                channels: desired.channels,
            });
        }

        let device = host.default_output_device().ok_or(HostError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| HostError::Config(e.to_string()))?
            .collect();
        let (channels, sample_rate) = select_config(&ranges, desired)?;

        if channels != desired.channels || sample_rate != desired.sample_rate {
            info!(
                "Device '{}' grants {}Hz/{}ch instead of {}Hz/{}ch",
                device_name, sample_rate, channels, desired.sample_rate, desired.channels
            );
        }

        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: match self.fixed_buffer {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        let stream = match desired.format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, callback)?,
            SampleFormat::S16 => build_stream::<i16>(&device, &config, callback)?,
        };

        // Some platforms start streams immediately; hold it until resumed
        if let Err(e) = stream.pause() {
            pb_core::host_debug!("Could not pause new stream on '{}': {}", device_name, e);
        }

        let granted = AudioSpec::new(sample_rate, channels, desired.format);
        pb_core::host_debug!("Opened '{}' at {}", device_name, granted);
        let device = self.register_device(device_name)?;

        Ok(CpalStream {
            stream,
            device,
            source: granted.with_format(SampleFormat::F32),
            granted,
        })
    }

    fn stream_format(&self, stream: &CpalStream) -> HostResult<(AudioSpec, AudioSpec)> {
        Ok((stream.source, stream.granted))
    }

    fn stream_device(&self, stream: &CpalStream) -> Option<DeviceId> {
        Some(stream.device)
    }

    fn resume_stream(&mut self, stream: &CpalStream) -> HostResult<()> {
        stream
            .stream
            .play()
            .map_err(|e| HostError::StreamPlay(e.to_string()))
    }

    fn destroy_stream(&mut self, stream: CpalStream) {
        let device = stream.device;
        drop(stream);
        if let Some(name) = self.release_device(device) {
            pb_core::host_debug!("Destroyed stream and released device {} '{}'", device, name);
        }
    }

    fn close_device(&mut self, device: DeviceId) {
        if let Some(name) = self.release_device(device) {
            pb_core::host_debug!("Closed audio device {} '{}'", device, name);
        }
    }
}
