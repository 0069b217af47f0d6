//! Audio output backend
//!
//! [`AudioOutput`] negotiates a device stream with an [`AudioHost`], wires
//! the stream to a mixer through a [`Bridge`], and owns the stream and
//! device until shutdown. The session lives behind `Rc<RefCell<_>>` so the
//! mixer's cleanup hook can reach it through a `Weak` without keeping it
//! alive; streams of some hosts are not `Send`, so neither is this.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use pb_core::{audio_debug, audio_trace};
use tracing::{info, warn};

use crate::bridge::Bridge;
use crate::error::{InitError, Result};
use crate::host::{AudioHost, DeviceId};
use crate::mixer::{Mixer, MixerFlags};
use crate::spec::{AudioSpec, SampleFormat};

struct Session<H: AudioHost> {
    host: H,
    stream: Option<H::Stream>,
    device: Option<DeviceId>,
    active_spec: Option<AudioSpec>,
    backend_name: Option<String>,
    /// Bumped per opened stream; a cleanup hook only acts on its own
    generation: u64,
}

impl<H: AudioHost> Session<H> {
    fn is_open(&self) -> bool {
        self.stream.is_some() || self.device.is_some()
    }

    fn teardown(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.host.destroy_stream(stream);
        }
        if let Some(device) = self.device.take() {
            self.host.close_device(device);
        }
        if self.active_spec.take().is_some() {
            audio_debug!("Audio output on {} shut down", self.host.name());
        }
        self.backend_name = None;
    }
}

/// Audio output feeding a mixer from a native host
pub struct AudioOutput<H: AudioHost + 'static> {
    session: Rc<RefCell<Session<H>>>,
}

impl<H: AudioHost + 'static> AudioOutput<H> {
    pub fn new(host: H) -> Self {
        Self {
            session: Rc::new(RefCell::new(Session {
                host,
                stream: None,
                device: None,
                active_spec: None,
                backend_name: None,
                generation: 0,
            })),
        }
    }

    /// Open an output stream and start feeding it from `mixer`.
    ///
    /// The device may grant a different rate, channel count or sample
    /// format than requested; the mixer is configured with what was
    /// granted. Float output is tried first, then 16-bit.
    pub fn initialize<M: Mixer>(
        &mut self,
        mixer: &mut M,
        flags: MixerFlags,
        sample_rate: u32,
        buffer_size: u32,
        channels: u16,
    ) -> Result<()> {
        let mut guard = self.session.borrow_mut();
        let session = &mut *guard;

        if session.is_open() {
            audio_debug!("Replacing the active audio stream");
            session.teardown();
        }

        if !session.host.was_init() {
            session
                .host
                .init_subsystem()
                .map_err(InitError::SubsystemUnavailable)?;
        }

        let bridge = Arc::new(Bridge::new(mixer.source()));
        let desired = AudioSpec::new(sample_rate, channels, SampleFormat::F32);
        audio_debug!("Requesting {} from {}", desired, session.host.name());

        let stream = match session.host.open_stream(&desired, bridge.callback()) {
            Ok(stream) => stream,
            Err(float) => {
                warn!("Float output unavailable ({}), trying 16-bit", float);
                let fallback = desired.with_format(SampleFormat::S16);
                session
                    .host
                    .open_stream(&fallback, bridge.callback())
                    .map_err(|fallback| InitError::DeviceOpenFailed { float, fallback })?
            }
        };
        let stream = session.stream.insert(stream);
        session.generation += 1;
        let generation = session.generation;

        let granted = match session.host.stream_format(stream) {
            Ok((source, granted)) => {
                audio_trace!("Stream input side {}, device side {}", source, granted);
                granted
            }
            Err(e) => {
                session.teardown();
                return Err(InitError::FormatQueryFailed(e));
            }
        };

        bridge.activate(granted);
        session.active_spec = Some(granted);
        session.device = session.host.stream_device(stream);

        mixer.postinit(granted.sample_rate, buffer_size, flags, granted.channels);

        let weak = Rc::downgrade(&self.session);
        mixer.set_backend_cleanup(Box::new(move || {
            let Some(session) = weak.upgrade() else {
                return;
            };
            let mut current = session.borrow_mut();
            if current.generation == generation {
                current.teardown();
            }
        }));

        if let Err(e) = session.host.resume_stream(stream) {
            warn!("Audio stream did not start: {}", e);
        }

        let name = session.host.name().to_string();
        mixer.set_backend_name(&name);
        info!("Audio output: {} via {}", granted, name);
        session.backend_name = Some(name);

        Ok(())
    }

    /// Destroy the stream and close the device. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.session.borrow_mut().teardown();
    }

    /// Configuration the device granted, while a stream is open
    pub fn active_spec(&self) -> Option<AudioSpec> {
        self.session.borrow().active_spec
    }

    pub fn device(&self) -> Option<DeviceId> {
        self.session.borrow().device
    }

    pub fn backend_name(&self) -> Option<String> {
        self.session.borrow().backend_name.clone()
    }

    pub fn is_active(&self) -> bool {
        self.session.borrow().stream.is_some()
    }

    pub fn host(&self) -> Ref<'_, H> {
        Ref::map(self.session.borrow(), |s| &s.host)
    }
}

impl<H: AudioHost + 'static> Drop for AudioOutput<H> {
    fn drop(&mut self) {
        if let Ok(mut session) = self.session.try_borrow_mut() {
            session.teardown();
        }
    }
}
