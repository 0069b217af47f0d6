//! Audio output bridge for pullbridge
//!
//! Connects a pull-based native output device to a software mixer:
//! negotiates a device configuration, feeds the device from the mixer on
//! the device's own thread, and tears everything down again.

pub mod bridge;
pub mod error;
pub mod host;
pub mod mixer;
pub mod output;
pub mod spec;

pub use bridge::Bridge;
pub use error::{InitError, Result};
pub use host::{AudioHost, DeviceId, HostError, StreamCallback, StreamSink};
pub use mixer::{MixSource, Mixer, MixerFlags, ToneMixer};
pub use output::AudioOutput;
pub use spec::{AudioSpec, SampleFormat};
