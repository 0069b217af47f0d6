//! End-to-end tests for device negotiation, the bridge callback and teardown

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pb_audio::host::{NullHost, NullHostProbe};
use pb_audio::mixer::BackendCleanup;
use pb_audio::{
    AudioOutput, AudioSpec, HostError, InitError, MixSource, Mixer, MixerFlags, SampleFormat,
    ToneMixer,
};

/// Source that writes a fixed value and counts calls per format
#[derive(Default)]
struct ConstSource {
    float_calls: AtomicUsize,
    int_calls: AtomicUsize,
}

impl MixSource for ConstSource {
    fn mix(&self, buffer: &mut [f32], _frames: usize) {
        self.float_calls.fetch_add(1, Ordering::SeqCst);
        buffer.fill(0.5);
    }

    fn mix_signed16(&self, buffer: &mut [i16], _frames: usize) {
        self.int_calls.fetch_add(1, Ordering::SeqCst);
        buffer.fill(-16384);
    }
}

/// Mixer that records what the backend told it
#[derive(Default)]
struct RecordingMixer {
    source: Arc<ConstSource>,
    postinit: Option<(u32, u32, MixerFlags, u16)>,
    cleanup: Option<BackendCleanup>,
    backend_name: Option<String>,
}

impl RecordingMixer {
    fn run_cleanup(&mut self) {
        if let Some(mut cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Mixer for RecordingMixer {
    type Source = ConstSource;

    fn source(&self) -> Arc<ConstSource> {
        Arc::clone(&self.source)
    }

    fn postinit(&mut self, sample_rate: u32, buffer_size: u32, flags: MixerFlags, channels: u16) {
        self.postinit = Some((sample_rate, buffer_size, flags, channels));
    }

    fn set_backend_cleanup(&mut self, cleanup: BackendCleanup) {
        self.cleanup = Some(cleanup);
    }

    fn set_backend_name(&mut self, name: &str) {
        self.backend_name = Some(name.to_string());
    }
}

fn output(host: NullHost) -> (AudioOutput<NullHost>, NullHostProbe) {
    let probe = host.probe();
    (AudioOutput::new(host), probe)
}

fn assert_released(probe: &NullHostProbe) {
    assert_eq!(probe.live_streams(), 0);
    assert!(probe.open_devices().is_empty());
}

#[test]
fn test_granted_rate_reaches_the_mixer() {
    let (mut output, probe) = output(NullHost::new().grant_rate(44100));
    let mut mixer = RecordingMixer::default();

    output
        .initialize(&mut mixer, MixerFlags::CLIP_ROUNDOFF, 48000, 2048, 2)
        .unwrap();

    assert_eq!(
        mixer.postinit,
        Some((44100, 2048, MixerFlags::CLIP_ROUNDOFF, 2))
    );
    assert_eq!(
        output.active_spec(),
        Some(AudioSpec::new(44100, 2, SampleFormat::F32))
    );
    assert_eq!(probe.open_attempts(), vec![AudioSpec::new(48000, 2, SampleFormat::F32)]);
}

#[test]
fn test_float_rejected_falls_back_to_s16() {
    let (mut output, probe) = output(NullHost::new().reject_format(SampleFormat::F32));
    let mut mixer = RecordingMixer::default();

    output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();

    assert_eq!(
        output.active_spec(),
        Some(AudioSpec::new(44100, 2, SampleFormat::S16))
    );
    assert_eq!(
        probe.open_attempts(),
        vec![
            AudioSpec::new(44100, 2, SampleFormat::F32),
            AudioSpec::new(44100, 2, SampleFormat::S16),
        ]
    );

    // Every callback renders 16-bit and converts
    for _ in 0..3 {
        assert_eq!(probe.pump(8 * 2 * 4), 1);
    }
    assert_eq!(mixer.source.int_calls.load(Ordering::SeqCst), 3);
    assert_eq!(mixer.source.float_calls.load(Ordering::SeqCst), 0);

    let samples = probe.samples();
    assert_eq!(samples.len(), 3 * 8 * 2);
    assert!(samples.iter().all(|&s| s == -0.5));
}

#[test]
fn test_both_formats_rejected() {
    let host = NullHost::new()
        .reject_format(SampleFormat::F32)
        .reject_format(SampleFormat::S16);
    let (mut output, probe) = output(host);
    let mut mixer = RecordingMixer::default();

    let err = output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap_err();

    assert_eq!(
        err,
        InitError::DeviceOpenFailed {
            float: HostError::UnsupportedFormat(SampleFormat::F32),
            fallback: HostError::UnsupportedFormat(SampleFormat::S16),
        }
    );
    assert_eq!(probe.open_attempts().len(), 2);
    assert_released(&probe);
    assert!(mixer.postinit.is_none());
    assert!(mixer.cleanup.is_none());
    assert!(!output.is_active());
    assert_eq!(output.active_spec(), None);
}

#[test]
fn test_subsystem_unavailable() {
    let (mut output, probe) = output(NullHost::new().fail_init());
    let mut mixer = RecordingMixer::default();

    let err = output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap_err();

    assert!(matches!(err, InitError::SubsystemUnavailable(HostError::Unavailable(_))));
    assert!(probe.open_attempts().is_empty());
    assert!(mixer.postinit.is_none());
}

#[test]
fn test_format_query_failure_destroys_stream() {
    let (mut output, probe) = output(NullHost::new().fail_format_query());
    let mut mixer = RecordingMixer::default();

    let err = output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap_err();

    assert!(matches!(err, InitError::FormatQueryFailed(_)));
    assert_eq!(probe.destroyed(), 1);
    assert_eq!(probe.closed(), 0);
    assert_eq!(probe.resumed(), 0);
    assert_released(&probe);
    assert!(mixer.postinit.is_none());
    assert_eq!(output.active_spec(), None);
}

#[test]
fn test_zero_channels_surface_as_open_failure() {
    let (mut output, probe) = output(NullHost::new());
    let mut mixer = RecordingMixer::default();

    let err = output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 0)
        .unwrap_err();

    match err {
        InitError::DeviceOpenFailed { float, fallback } => {
            assert!(matches!(float, HostError::InvalidSpec { channels: 0, .. }));
            assert!(matches!(fallback, HostError::InvalidSpec { channels: 0, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_released(&probe);
}

#[test]
fn test_shutdown_is_idempotent() {
    let (mut output, probe) = output(NullHost::new());
    let mut mixer = RecordingMixer::default();
    output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();

    output.shutdown();
    output.shutdown();

    assert_eq!(probe.destroyed(), 1);
    assert_eq!(probe.closed(), 1);
    assert_released(&probe);
    assert_eq!(output.backend_name(), None);
}

#[test]
fn test_shutdown_after_failed_negotiation() {
    let host = NullHost::new()
        .reject_format(SampleFormat::F32)
        .reject_format(SampleFormat::S16);
    let (mut output, probe) = output(host);
    let mut mixer = RecordingMixer::default();
    assert!(output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .is_err());

    output.shutdown();
    output.shutdown();

    assert_eq!(probe.destroyed(), 0);
    assert_eq!(probe.closed(), 0);
}

#[test]
fn test_cleanup_hook_tears_down() {
    let (mut output, probe) = output(NullHost::new());
    let mut mixer = RecordingMixer::default();
    output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();
    assert_eq!(mixer.backend_name.as_deref(), Some("null"));

    mixer.run_cleanup();

    assert!(!output.is_active());
    assert_eq!(output.device(), None);
    assert_eq!(probe.destroyed(), 1);
    assert_released(&probe);
}

#[test]
fn test_replaced_mixer_cleanup_leaves_new_stream_alone() {
    let (mut output, probe) = output(NullHost::new());
    let mut first = ToneMixer::new(440.0);
    let mut second = ToneMixer::new(880.0);

    output
        .initialize(&mut first, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();
    output
        .initialize(&mut second, MixerFlags::default(), 48000, 1024, 2)
        .unwrap();
    let device = output.device();

    drop(first);

    assert!(output.is_active());
    assert_eq!(output.device(), device);
    assert_eq!(probe.live_streams(), 1);
    assert_eq!(probe.destroyed(), 1);

    second.deinit();
    assert!(!output.is_active());
    assert_released(&probe);
}

#[test]
fn test_stale_cleanup_after_shutdown_and_reopen() {
    let (mut output, probe) = output(NullHost::new());
    let mut first = RecordingMixer::default();
    let mut second = RecordingMixer::default();

    output
        .initialize(&mut first, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();
    output.shutdown();
    output
        .initialize(&mut second, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();

    first.run_cleanup();
    assert!(output.is_active());
    assert_eq!(probe.live_streams(), 1);

    second.run_cleanup();
    assert!(!output.is_active());
    assert_released(&probe);
}

#[test]
fn test_cleanup_hook_outliving_output_is_harmless() {
    let (mut output, probe) = output(NullHost::new());
    let mut mixer = RecordingMixer::default();
    output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();

    drop(output);
    mixer.run_cleanup();

    assert_eq!(probe.destroyed(), 1);
    assert_eq!(probe.closed(), 1);
}

#[test]
fn test_drop_tears_down() {
    let (mut output, probe) = output(NullHost::new());
    let mut mixer = ToneMixer::new(440.0);
    output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();
    assert_eq!(probe.live_streams(), 1);

    drop(output);

    assert_released(&probe);
    assert_eq!(probe.closed(), 1);
}

#[test]
fn test_resume_failure_still_initializes() {
    let (mut output, probe) = output(NullHost::new().fail_resume());
    let mut mixer = RecordingMixer::default();

    output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();

    assert!(output.is_active());
    assert_eq!(probe.resumed(), 1);
    assert_eq!(probe.paused_streams(), 1);
    assert_eq!(probe.pump(64), 0);
}

#[test]
fn test_active_spec_follows_the_device() {
    for channels in 1..=8u16 {
        for rate in [8000u32, 22050, 44100, 96000] {
            let granted_rate = rate / 2;
            let granted_channels = channels.min(2);
            let host = NullHost::new()
                .grant_rate(granted_rate)
                .grant_channels(granted_channels);
            let (mut output, _probe) = output(host);
            let mut mixer = RecordingMixer::default();

            output
                .initialize(&mut mixer, MixerFlags::default(), rate, 512, channels)
                .unwrap();

            let spec = output.active_spec().unwrap();
            assert_eq!(spec.sample_rate, granted_rate);
            assert_eq!(spec.channels, granted_channels);
            assert_eq!(
                mixer.postinit,
                Some((granted_rate, 512, MixerFlags::default(), granted_channels))
            );
        }
    }
}

#[test]
fn test_tone_plays_through_null_host() {
    let (mut output, probe) = output(NullHost::new().grant_rate(8000).grant_channels(1));
    let mut mixer = ToneMixer::new(2000.0);

    output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 256, 2)
        .unwrap();
    assert_eq!(mixer.sample_rate(), 8000);
    assert_eq!(mixer.channels(), 1);

    probe.pump(4 * 4);
    let samples = probe.take_samples();
    assert_eq!(samples.len(), 4);
    assert!((samples[1] - 1.0).abs() < 1e-6);
    assert!((samples[3] + 1.0).abs() < 1e-6);

    mixer.deinit();
    assert!(!output.is_active());
    assert_released(&probe);
}

#[test]
fn test_rejected_pushes_are_swallowed() {
    let (mut output, probe) = output(NullHost::new().fail_push());
    let mut mixer = RecordingMixer::default();
    output
        .initialize(&mut mixer, MixerFlags::default(), 44100, 1024, 2)
        .unwrap();

    assert_eq!(probe.pump(256), 1);
    assert_eq!(mixer.source.float_calls.load(Ordering::SeqCst), 1);
    assert!(probe.samples().is_empty());
}
