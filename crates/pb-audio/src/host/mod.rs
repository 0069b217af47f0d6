//! Native audio subsystems
//!
//! An [`AudioHost`] owns the platform side of output: it opens a device
//! stream in a paused state, reports the configuration the device granted,
//! and calls back into the registered [`StreamCallback`] from its own
//! thread whenever the device needs more data.

use std::fmt;
use std::num::NonZeroU32;

use thiserror::Error;

use crate::spec::{AudioSpec, SampleFormat};

#[cfg(feature = "cpal-host")]
pub mod cpal_host;
pub mod null;

#[cfg(feature = "cpal-host")]
pub use cpal_host::CpalHost;
pub use null::{NullHost, NullHostProbe};

/// Errors reported by a native subsystem
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Audio subsystem is not initialized")]
    NotInitialized,
    #[error("Audio subsystem unavailable: {0}")]
    Unavailable(String),
    #[error("No audio output device available")]
    NoDevice,
    #[error("Invalid stream spec: {sample_rate}Hz, {channels} channels")]
    InvalidSpec { sample_rate: u32, channels: u16 },
    #[error("Sample format {0} not supported by the device")]
    UnsupportedFormat(SampleFormat),
    #[error("Failed to get device config: {0}")]
    Config(String),
    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),
    #[error("Failed to start audio stream: {0}")]
    StreamPlay(String),
    #[error("Rejected by host: {0}")]
    Rejected(String),
    #[error("Stream overflow: {offered} samples offered, room for {capacity}")]
    Overflow { capacity: usize, offered: usize },
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Opaque identifier of an open output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(NonZeroU32);

impl DeviceId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Input side of a device stream, as seen from inside a callback
pub trait StreamSink {
    /// Queue interleaved native-endian `f32` samples, as raw bytes.
    fn put_data(&mut self, bytes: &[u8]) -> HostResult<()>;
}

/// Decode bytes handed to [`StreamSink::put_data`] back into samples.
/// A trailing partial sample is ignored.
pub fn decode_f32(bytes: &[u8]) -> impl Iterator<Item = f32> + '_ {
    bytes
        .chunks_exact(std::mem::size_of::<f32>())
        .map(bytemuck::pod_read_unaligned::<f32>)
}

/// Data-producer entry point registered when a stream is opened.
///
/// Called with the stream's input side, the number of bytes the device
/// needs right now, and the total it would like to have queued.
pub type StreamCallback = Box<dyn FnMut(&mut dyn StreamSink, usize, usize) + Send + 'static>;

/// A native audio output subsystem
pub trait AudioHost {
    /// Handle to an open device stream
    type Stream;

    /// Human-readable backend identifier
    fn name(&self) -> &str;

    /// Whether the subsystem has already been brought up
    fn was_init(&self) -> bool;

    /// Bring the subsystem up
    fn init_subsystem(&mut self) -> HostResult<()>;

    /// Open a paused stream on the default output device.
    ///
    /// `callback` is not invoked until the stream is resumed.
    fn open_stream(&mut self, desired: &AudioSpec, callback: StreamCallback)
        -> HostResult<Self::Stream>;

    /// Read back the stream's (input, device) configuration
    fn stream_format(&self, stream: &Self::Stream) -> HostResult<(AudioSpec, AudioSpec)>;

    /// Device backing the stream
    fn stream_device(&self, stream: &Self::Stream) -> Option<DeviceId>;

    /// Start callbacks on a paused stream
    fn resume_stream(&mut self, stream: &Self::Stream) -> HostResult<()>;

    /// Destroy a stream; no callback runs after this returns
    fn destroy_stream(&mut self, stream: Self::Stream);

    /// Close a device previously returned by [`AudioHost::stream_device`]
    fn close_device(&mut self, device: DeviceId);
}
