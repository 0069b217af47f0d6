//! Null audio host
//!
//! An in-process stand-in for a native subsystem. It produces no sound;
//! instead it records what the backend asked for and captures every sample
//! the stream callback pushes. Failures can be scripted per operation, and
//! device callbacks are driven explicitly through [`NullHostProbe::pump`].

use std::sync::Arc;

use parking_lot::Mutex;

use super::{decode_f32, AudioHost, DeviceId, HostError, HostResult, StreamCallback, StreamSink};
use crate::spec::{AudioSpec, SampleFormat};

/// Sink that collects pushed samples
#[derive(Debug, Default)]
pub struct CaptureSink {
    samples: Vec<f32>,
    reject: bool,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that refuses every push
    pub fn rejecting() -> Self {
        Self {
            samples: Vec::new(),
            reject: true,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl StreamSink for CaptureSink {
    fn put_data(&mut self, bytes: &[u8]) -> HostResult<()> {
        if self.reject {
            return Err(HostError::Rejected("stream input is closed".to_string()));
        }
        self.samples.extend(decode_f32(bytes));
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct Script {
    fail_init: bool,
    rejected: Vec<SampleFormat>,
    granted_rate: Option<u32>,
    granted_channels: Option<u16>,
    fail_format_query: bool,
    fail_resume: bool,
    fail_push: bool,
}

struct StreamEntry {
    id: u64,
    device: DeviceId,
    source: AudioSpec,
    granted: AudioSpec,
    callback: StreamCallback,
    paused: bool,
}

#[derive(Default)]
struct NullState {
    script: Script,
    initialized: bool,
    open_attempts: Vec<AudioSpec>,
    streams: Vec<StreamEntry>,
    open_devices: Vec<DeviceId>,
    next_id: u32,
    samples: Vec<f32>,
    resumed: usize,
    destroyed: usize,
    closed: usize,
}

impl NullState {
    fn entry(&self, stream: &NullStream) -> HostResult<&StreamEntry> {
        self.streams
            .iter()
            .find(|e| e.id == stream.id)
            .ok_or_else(|| HostError::Rejected(format!("unknown stream {}", stream.id)))
    }
}

/// Handle to a stream opened on a [`NullHost`]
#[derive(Debug, PartialEq, Eq)]
pub struct NullStream {
    id: u64,
}

/// Scripted host with no sound output
pub struct NullHost {
    state: Arc<Mutex<NullState>>,
}

impl NullHost {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NullState::default())),
        }
    }

    /// Observer that stays valid after the host is moved into a backend
    pub fn probe(&self) -> NullHostProbe {
        NullHostProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn script(self, edit: impl FnOnce(&mut Script)) -> Self {
        edit(&mut self.state.lock().script);
        self
    }

    /// Make subsystem initialization fail
    pub fn fail_init(self) -> Self {
        self.script(|s| s.fail_init = true)
    }

    /// Refuse to open streams in `format`
    pub fn reject_format(self, format: SampleFormat) -> Self {
        self.script(|s| s.rejected.push(format))
    }

    /// Grant this sample rate regardless of the request
    pub fn grant_rate(self, rate: u32) -> Self {
        self.script(|s| s.granted_rate = Some(rate))
    }

    /// Grant this channel count regardless of the request
    pub fn grant_channels(self, channels: u16) -> Self {
        self.script(|s| s.granted_channels = Some(channels))
    }

    pub fn fail_format_query(self) -> Self {
        self.script(|s| s.fail_format_query = true)
    }

    pub fn fail_resume(self) -> Self {
        self.script(|s| s.fail_resume = true)
    }

    /// Reject every sample pushed by stream callbacks
    pub fn fail_push(self) -> Self {
        self.script(|s| s.fail_push = true)
    }
}

impl Default for NullHost {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHost for NullHost {
    type Stream = NullStream;

    fn name(&self) -> &str {
        "null"
    }

    fn was_init(&self) -> bool {
        self.state.lock().initialized
    }

    fn init_subsystem(&mut self) -> HostResult<()> {
        let mut state = self.state.lock();
        if state.script.fail_init {
            return Err(HostError::Unavailable("null host scripted to fail".to_string()));
        }
        state.initialized = true;
        Ok(())
    }

    fn open_stream(
        &mut self,
        desired: &AudioSpec,
        callback: StreamCallback,
    ) -> HostResult<NullStream> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(HostError::NotInitialized);
        }
        state.open_attempts.push(*desired);

        if desired.sample_rate == 0 || desired.channels == 0 {
            return Err(HostError::InvalidSpec {
                sample_rate: desired.sample_rate,
                channels: desired.channels,
            });
        }
        if state.script.rejected.contains(&desired.format) {
            return Err(HostError::UnsupportedFormat(desired.format));
        }

        let granted = AudioSpec {
            sample_rate: state.script.granted_rate.unwrap_or(desired.sample_rate),
            channels: state.script.granted_channels.unwrap_or(desired.channels),
            format: desired.format,
        };

        state.next_id += 1;
        let id = state.next_id;
        let device = DeviceId::new(id).ok_or(HostError::NoDevice)?;
        state.open_devices.push(device);
        state.streams.push(StreamEntry {
            id: u64::from(id),
            device,
            source: granted.with_format(SampleFormat::F32),
            granted,
            callback,
            paused: true,
        });

        pb_core::host_debug!("Null stream {} opened on device {} ({})", id, device, granted);
        Ok(NullStream { id: u64::from(id) })
    }

    fn stream_format(&self, stream: &NullStream) -> HostResult<(AudioSpec, AudioSpec)> {
        let state = self.state.lock();
        if state.script.fail_format_query {
            return Err(HostError::Rejected("format query scripted to fail".to_string()));
        }
        state.entry(stream).map(|e| (e.source, e.granted))
    }

    fn stream_device(&self, stream: &NullStream) -> Option<DeviceId> {
        self.state.lock().entry(stream).ok().map(|e| e.device)
    }

    fn resume_stream(&mut self, stream: &NullStream) -> HostResult<()> {
        let mut state = self.state.lock();
        state.resumed += 1;
        if state.script.fail_resume {
            return Err(HostError::StreamPlay("resume scripted to fail".to_string()));
        }
        let entry = state
            .streams
            .iter_mut()
            .find(|e| e.id == stream.id)
            .ok_or_else(|| HostError::Rejected(format!("unknown stream {}", stream.id)))?;
        entry.paused = false;
        Ok(())
    }

    fn destroy_stream(&mut self, stream: NullStream) {
        let mut state = self.state.lock();
        // A device stream owns its device; destroying it releases both
        if let Some(pos) = state.streams.iter().position(|e| e.id == stream.id) {
            let entry = state.streams.remove(pos);
            state.open_devices.retain(|&d| d != entry.device);
        }
        state.destroyed += 1;
        pb_core::host_debug!("Null stream {} destroyed", stream.id);
    }

    fn close_device(&mut self, device: DeviceId) {
        let mut state = self.state.lock();
        state.open_devices.retain(|&d| d != device);
        state.closed += 1;
        pb_core::host_debug!("Null device {} closed", device);
    }
}

/// Shared view of a [`NullHost`]'s state
#[derive(Clone)]
pub struct NullHostProbe {
    state: Arc<Mutex<NullState>>,
}

impl NullHostProbe {
    /// Act as the device thread: invoke every resumed stream's callback
    /// asking for `bytes` bytes. Returns the number of streams driven.
    pub fn pump(&self, bytes: usize) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut driven = 0;

        for entry in state.streams.iter_mut().filter(|e| !e.paused) {
            let mut sink = if state.script.fail_push {
                CaptureSink::rejecting()
            } else {
                CaptureSink::new()
            };
            (entry.callback)(&mut sink, bytes, bytes);
            state.samples.extend_from_slice(sink.samples());
            driven += 1;
        }
        driven
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Every spec passed to `open_stream`, in order
    pub fn open_attempts(&self) -> Vec<AudioSpec> {
        self.state.lock().open_attempts.clone()
    }

    pub fn live_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    pub fn paused_streams(&self) -> usize {
        self.state.lock().streams.iter().filter(|e| e.paused).count()
    }

    pub fn open_devices(&self) -> Vec<DeviceId> {
        self.state.lock().open_devices.clone()
    }

    pub fn resumed(&self) -> usize {
        self.state.lock().resumed
    }

    pub fn destroyed(&self) -> usize {
        self.state.lock().destroyed
    }

    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    /// Samples captured so far
    pub fn samples(&self) -> Vec<f32> {
        self.state.lock().samples.clone()
    }

    /// Drain the captured samples
    pub fn take_samples(&self) -> Vec<f32> {
        std::mem::take(&mut self.state.lock().samples)
    }
}
