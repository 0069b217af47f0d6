//! Device callback that pulls frames from the mixer
//!
//! The device always receives interleaved `f32` samples. When the granted
//! format is 16-bit, the mixer renders `i16` and the bridge scales it to
//! float before pushing.

use std::mem::size_of;
use std::sync::{Arc, OnceLock};

use crate::host::{StreamCallback, StreamSink};
use crate::mixer::MixSource;
use crate::spec::{AudioSpec, SampleFormat};

/// Convert one 16-bit sample to float with a plain linear scale.
///
/// No clamping: `-32768` maps to exactly `-1.0`, `32767` to just below `1.0`.
#[inline]
pub fn s16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Callback context shared between the backend and the device thread
pub struct Bridge<S: MixSource> {
    mixer: Arc<S>,
    spec: OnceLock<AudioSpec>,
}

impl<S: MixSource> Bridge<S> {
    pub fn new(mixer: Arc<S>) -> Self {
        Self {
            mixer,
            spec: OnceLock::new(),
        }
    }

    /// Record the granted spec. Only the first call has an effect; returns
    /// whether this call set it.
    pub fn activate(&self, spec: AudioSpec) -> bool {
        self.spec.set(spec).is_ok()
    }

    pub fn active_spec(&self) -> Option<&AudioSpec> {
        self.spec.get()
    }

    /// Boxed entry point for [`crate::host::AudioHost::open_stream`]
    pub fn callback(self: &Arc<Self>) -> StreamCallback {
        let bridge = Arc::clone(self);
        Box::new(move |sink: &mut dyn StreamSink, additional: usize, total: usize| {
            bridge.fill(sink, additional, total)
        })
    }

    /// Render `additional` bytes worth of float frames into `sink`.
    ///
    /// Runs on the device thread. A rejected push only costs this buffer
    /// window.
    pub fn fill(&self, sink: &mut dyn StreamSink, additional: usize, _total: usize) {
        let Some(spec) = self.spec.get() else {
            return;
        };
        let channels = usize::from(spec.channels);
        if channels == 0 {
            return;
        }
        let frames = additional / (channels * size_of::<f32>());
        if frames == 0 {
            return;
        }

        let samples = frames * channels;
        let mut buffer = vec![0.0f32; samples];

        match spec.format {
            SampleFormat::F32 => self.mixer.mix(&mut buffer, frames),
            SampleFormat::S16 => {
                let mut ints = vec![0i16; samples];
                self.mixer.mix_signed16(&mut ints, frames);
                for (out, &sample) in buffer.iter_mut().zip(&ints) {
                    *out = s16_to_f32(sample);
                }
            }
        }

        let _ = sink.put_data(bytemuck::cast_slice(&buffer));
    }
}
