//! Stream format descriptions

use std::fmt;
use std::mem::size_of;

/// Sample encoding exchanged with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// 32-bit float, nominal range [-1.0, 1.0]
    F32,
    /// 16-bit signed integer
    S16,
}

impl SampleFormat {
    /// Size of one sample in bytes
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::F32 => size_of::<f32>(),
            Self::S16 => size_of::<i16>(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::S16 => "s16",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sample rate, channel count and format of one side of a stream.
///
/// After negotiation the backend keeps the *granted* spec, which may differ
/// from the one it asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
}

impl AudioSpec {
    pub const fn new(sample_rate: u32, channels: u16, format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            format,
        }
    }

    /// Same spec with another sample format
    pub const fn with_format(self, format: SampleFormat) -> Self {
        Self { format, ..self }
    }

    /// Bytes in one interleaved frame
    pub const fn frame_bytes(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }
}

impl fmt::Display for AudioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz {}ch {}", self.sample_rate, self.channels, self.format)
    }
}
