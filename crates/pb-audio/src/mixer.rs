//! Mixer interface and a reference tone mixer
//!
//! The bridge only needs two things from a mixer: an audio-thread side
//! ([`MixSource`]) that renders interleaved frames on request, and an owner
//! side ([`Mixer`]) that is told about the negotiated configuration.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

bitflags! {
    /// Behaviour flags forwarded to the mixer at post-initialization
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MixerFlags: u32 {
        /// Clamp output to [-1.0, 1.0]
        const CLIP_ROUNDOFF = 1;
        /// Keep data for visualization
        const ENABLE_VISUALIZATION = 2;
        /// Use a left-handed 3D coordinate system
        const LEFT_HANDED_3D = 4;
        /// Leave the FPU control register alone
        const NO_FPU_REGISTER_CHANGE = 8;
    }
}

impl Default for MixerFlags {
    fn default() -> Self {
        Self::CLIP_ROUNDOFF
    }
}

/// Releases the backend that feeds a mixer. Registered by the backend at
/// initialization; the mixer's owner calls it at shutdown.
pub type BackendCleanup = Box<dyn FnMut()>;

/// Audio-thread side of a mixer.
///
/// Both calls render exactly `frames` interleaved frames into `buffer`,
/// whose length is `frames * channels`.
pub trait MixSource: Send + Sync + 'static {
    fn mix(&self, buffer: &mut [f32], frames: usize);
    fn mix_signed16(&self, buffer: &mut [i16], frames: usize);
}

/// Owner side of a mixer
pub trait Mixer {
    type Source: MixSource;

    /// Shared handle given to the device callback
    fn source(&self) -> Arc<Self::Source>;

    /// Final device configuration, called once negotiation succeeded
    fn postinit(&mut self, sample_rate: u32, buffer_size: u32, flags: MixerFlags, channels: u16);

    fn set_backend_cleanup(&mut self, cleanup: BackendCleanup);

    fn set_backend_name(&mut self, name: &str);
}

/// `f32` stored as bits so both threads can touch it without locking
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Audio-thread half of [`ToneMixer`].
///
/// Controls are atomics written from the owner thread; phase is only
/// advanced by the audio thread.
pub struct ToneSource {
    frequency: AtomicF32,
    volume: AtomicF32,
    phase: AtomicF32,
    sample_rate: AtomicU32,
    channels: AtomicU16,
    clip: AtomicBool,
}

impl ToneSource {
    /// Fill `frames` frames, writing the same value to every channel
    fn render<T: Copy>(&self, buffer: &mut [T], frames: usize, convert: impl Fn(f32) -> T) {
        if frames == 0 {
            return;
        }
        let channels = (buffer.len() / frames).max(1);
        let sample_rate = self.sample_rate.load(Ordering::Relaxed);
        if sample_rate == 0 {
            buffer.fill(convert(0.0));
            return;
        }

        let step = self.frequency.load() / sample_rate as f32;
        let volume = self.volume.load();
        let clip = self.clip.load(Ordering::Relaxed);
        let mut phase = self.phase.load();

        for frame in buffer.chunks_mut(channels).take(frames) {
            let mut value = (phase * TAU).sin() * volume;
            if clip {
                value = value.clamp(-1.0, 1.0);
            }
            frame.fill(convert(value));
            phase = (phase + step).fract();
        }
        self.phase.store(phase);
    }
}

impl MixSource for ToneSource {
    fn mix(&self, buffer: &mut [f32], frames: usize) {
        self.render(buffer, frames, |v| v);
    }

    fn mix_signed16(&self, buffer: &mut [i16], frames: usize) {
        self.render(buffer, frames, |v| (v.clamp(-1.0, 1.0) * 32767.0) as i16);
    }
}

/// Sine tone generator with a master volume.
///
/// Until [`Mixer::postinit`] runs it renders silence.
pub struct ToneMixer {
    source: Arc<ToneSource>,
    buffer_size: u32,
    flags: MixerFlags,
    backend_name: Option<String>,
    cleanup: Option<BackendCleanup>,
}

impl ToneMixer {
    /// Create a tone mixer at unity volume
    pub fn new(frequency: f32) -> Self {
        Self {
            source: Arc::new(ToneSource {
                frequency: AtomicF32::new(frequency),
                volume: AtomicF32::new(1.0),
                phase: AtomicF32::new(0.0),
                sample_rate: AtomicU32::new(0),
                channels: AtomicU16::new(0),
                clip: AtomicBool::new(true),
            }),
            buffer_size: 0,
            flags: MixerFlags::empty(),
            backend_name: None,
            cleanup: None,
        }
    }

    /// Set master volume (clamped between 0.0 and 1.0).
    pub fn set_volume(&self, volume: f32) {
        self.source.volume.store(volume.clamp(0.0, 1.0));
    }

    pub fn volume(&self) -> f32 {
        self.source.volume.load()
    }

    pub fn set_frequency(&self, frequency: f32) {
        self.source.frequency.store(frequency);
    }

    /// Sample rate the device granted, 0 before initialization
    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate.load(Ordering::Relaxed)
    }

    /// Channel count the device granted, 0 before initialization
    pub fn channels(&self) -> u16 {
        self.source.channels.load(Ordering::Relaxed)
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn flags(&self) -> MixerFlags {
        self.flags
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend_name.as_deref()
    }

    /// Release the backend through its cleanup hook, if one is registered
    pub fn deinit(&mut self) {
        if let Some(mut cleanup) = self.cleanup.take() {
            cleanup();
        }
        self.backend_name = None;
    }
}

impl Mixer for ToneMixer {
    type Source = ToneSource;

    fn source(&self) -> Arc<ToneSource> {
        Arc::clone(&self.source)
    }

    // Runs before the stream is resumed, so the phase reset cannot race
    // the audio thread
    fn postinit(&mut self, sample_rate: u32, buffer_size: u32, flags: MixerFlags, channels: u16) {
        let source = &self.source;
        source.phase.store(0.0);
        source
            .clip
            .store(flags.contains(MixerFlags::CLIP_ROUNDOFF), Ordering::Relaxed);
        source.channels.store(channels, Ordering::Relaxed);
        source.sample_rate.store(sample_rate, Ordering::Relaxed);

        self.buffer_size = buffer_size;
        self.flags = flags;
    }

    fn set_backend_cleanup(&mut self, cleanup: BackendCleanup) {
        self.cleanup = Some(cleanup);
    }

    fn set_backend_name(&mut self, name: &str) {
        self.backend_name = Some(name.to_string());
    }
}

impl Drop for ToneMixer {
    fn drop(&mut self) {
        self.deinit();
    }
}
