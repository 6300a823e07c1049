//! End-to-end sessions: capture → ring → source → shaping → frames.

use std::f32::consts::PI;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use spectra::audio::{CaptureBackend, CaptureSink, IndexMap};
use spectra::params::{AnalyzerConfig, SharedTunables, Tunables};
use spectra::shaping::{attenuation_curve, ATTENUATION_OFFSET, CLIP, COUNT_LOG_BASE};
use spectra::{Analyzer, Error, Mode, State};

#[derive(Clone, Default)]
struct ManualCapture {
    sink: Arc<Mutex<Option<CaptureSink>>>,
}

impl ManualCapture {
    fn push(&self, samples: &[f32]) {
        let sink = self.sink.lock();
        sink.as_ref().expect("capture started").on_samples(samples);
    }
}

impl CaptureBackend for ManualCapture {
    fn start(&mut self, sink: CaptureSink) -> spectra::Result<()> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.lock().take();
    }

    fn sample_rate(&self) -> u32 {
        48_000
    }
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<u8>>>);

impl Recorder {
    /// Most recent complete frame
    fn last_frame(&self, frame_len: usize) -> Vec<u8> {
        let bytes = self.0.lock();
        assert!(bytes.len() >= frame_len, "no frame written");
        assert_eq!(bytes.len() % frame_len, 0, "partial frame on the wire");
        bytes[bytes.len() - frame_len..].to_vec()
    }
}

impl Write for Recorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn test_config() -> AnalyzerConfig {
    AnalyzerConfig {
        warm_up: Duration::from_millis(10),
        stop_grace: Duration::from_millis(50),
        ..Default::default()
    }
}

fn session(tunables: Tunables) -> (Analyzer, ManualCapture, Recorder) {
    let capture = ManualCapture::default();
    let recorder = Recorder::default();
    let mut analyzer = Analyzer::new(test_config(), SharedTunables::new(tunables))
        .with_capture(Box::new(capture.clone()));
    analyzer.bind_transport(recorder.clone());
    (analyzer, capture, recorder)
}

fn tone(config: &AnalyzerConfig, hz: f32) -> Vec<f32> {
    (0..config.sample_count)
        .map(|n| 0.5 * (2.0 * PI * hz * n as f32 / config.sample_rate_hz as f32).sin())
        .collect()
}

/// Bucket the 1000 Hz test tone lands in
fn tone_bucket(config: &AnalyzerConfig) -> usize {
    let nearest_bin = (1000.0 / config.frequency_resolution()).round() as usize;
    IndexMap::from_config(config).map()[nearest_bin - config.frequency_offset()]
}

/// Shaped frame for the 1000 Hz tone under `tunables`
fn tone_frame(tunables: Tunables) -> Vec<u8> {
    let config = test_config();
    let (mut analyzer, capture, recorder) = session(tunables);

    analyzer.start(Mode::Spectrum).unwrap();
    capture.push(&tone(&config, 1000.0));
    thread::sleep(Duration::from_millis(200));
    analyzer.stop().unwrap();

    recorder.last_frame(config.frame_len())
}

/// Smallest pre-attenuation value that encodes to `byte`
fn unattenuate(byte: u8) -> f32 {
    CLIP * (((byte as f32 + ATTENUATION_OFFSET) / (CLIP + ATTENUATION_OFFSET)).ln() + 1.0)
}

#[test]
fn test_tone_lights_its_bucket() {
    let config = test_config();
    let expected = tone_bucket(&config);
    let frame = tone_frame(Tunables {
        pre_gain: 0.005,
        ..Default::default()
    });
    assert_eq!(frame[0], 1);
    assert_eq!(frame[config.frame_len() - 1], 1);

    let buckets = &frame[1..config.frame_len() - 1];
    let peak = buckets[expected];
    assert!(peak > 64, "tone bucket only reached {}", peak);
    for (i, &b) in buckets.iter().enumerate() {
        assert!(b <= peak, "bucket {} ({}) above tone bucket ({})", i, b, peak);
        if i.abs_diff(expected) >= 10 {
            assert!(b < 16, "bucket {} far from the tone reads {}", i, b);
        }
    }
}

#[test]
fn test_blend_spreads_tone_into_neighbours() {
    let config = test_config();
    let expected = tone_bucket(&config);
    let counts = IndexMap::from_config(&config).counts().to_vec();
    let count_divisor = |bucket: usize| (counts[bucket] as f32 + COUNT_LOG_BASE).log(COUNT_LOG_BASE);

    let unblended = Tunables {
        pre_gain: 0.003,
        blend: 0.0,
        soft_max: false,
        ..Default::default()
    };
    let beta = 0.5;
    let blended = Tunables { blend: beta, ..unblended };

    let plain = tone_frame(unblended);
    let spread = tone_frame(blended);

    let peak = plain[1 + expected];
    assert!(peak < 255, "unblended tone bucket clipped");
    assert!(spread[1 + expected] < peak, "blend did not pull the peak down");

    // Pre-blend peak (post gain applied), recovered from the unblended frame
    let peak_sum = unattenuate(peak) * count_divisor(expected);
    for neighbour in [expected - 1, expected + 1] {
        assert!(spread[1 + neighbour] > plain[1 + neighbour]);

        let share = beta / (1.0 + 2.0 * beta) * peak_sum / count_divisor(neighbour);
        let floor = attenuation_curve(share).clamp(0.0, CLIP) as u8;
        assert!(
            spread[1 + neighbour] >= floor,
            "bucket {} reads {}, below its blend share {}",
            neighbour,
            spread[1 + neighbour],
            floor
        );
    }
}

#[test]
fn test_waveform_frames_are_unshaped() {
    let config = test_config();
    let tunables = Tunables {
        pre_gain: 100.0,
        ..Default::default()
    };
    let (mut analyzer, capture, recorder) = session(tunables);

    analyzer.start(Mode::Waveform).unwrap();
    capture.push(&vec![0.5; config.waveform_sample_count]);
    thread::sleep(Duration::from_millis(100));
    analyzer.stop().unwrap();

    let frame = recorder.last_frame(config.frame_len());
    assert!(frame[1..config.frame_len() - 1].iter().all(|&b| b == 50));
}

#[test]
fn test_restart_after_stop() {
    let (mut analyzer, _capture, recorder) = session(Tunables::default());

    analyzer.start(Mode::Spectrum).unwrap();
    analyzer.stop().unwrap();
    assert_eq!(analyzer.state(), State::Idle);

    analyzer.start(Mode::Procedural).unwrap();
    thread::sleep(Duration::from_millis(50));
    analyzer.stop().unwrap();

    assert!(!recorder.0.lock().is_empty());
}

#[test]
fn test_unbound_analyzer_refuses_to_start() {
    let mut analyzer = Analyzer::new(test_config(), SharedTunables::default())
        .with_capture(Box::new(ManualCapture::default()));

    for mode in [Mode::Spectrum, Mode::Waveform, Mode::Procedural] {
        assert!(matches!(analyzer.start(mode), Err(Error::Configuration(_))));
    }
    assert_eq!(analyzer.state(), State::Idle);
}
