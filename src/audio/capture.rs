//! Capture backends feeding the ring buffer.
//!
//! A backend owns the producer side: it pushes interleaved `f32` PCM into a
//! [`CaptureSink`] from its own thread (the cpal callback or a WAV feeder).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;

use super::ring_buffer::{RingBuffer, RingBufferError};
use crate::error::{Error, Result};

/// Producer handle onto a session's ring buffer
#[derive(Debug, Clone)]
pub struct CaptureSink {
    ring: Arc<RingBuffer>,
    lost: Arc<AtomicBool>,
}

impl CaptureSink {
    pub fn new(ring: Arc<RingBuffer>) -> Self {
        Self {
            ring,
            lost: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Push raw interleaved PCM bytes
    pub fn on_data(&self, bytes: &[u8]) {
        if let Err(RingBufferError::Overflow { requested, written }) = self.ring.write(bytes) {
            log::warn!(
                "capture overflow: dropped {} of {} bytes",
                requested - written,
                requested
            );
        }
    }

    pub fn on_samples(&self, samples: &[f32]) {
        self.on_data(bytemuck::cast_slice(samples));
    }

    /// Flag the capture stream as gone; the frame loop ends on its next frame
    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}

/// Audio input collaborator
pub trait CaptureBackend {
    /// Begin delivering samples into `sink`
    fn start(&mut self, sink: CaptureSink) -> Result<()>;

    /// Release the stream; a no-op when not started
    fn stop(&mut self);

    /// Rate the backend delivers at (Hz)
    fn sample_rate(&self) -> u32;
}

/// Live input from a cpal device
pub struct CpalCapture {
    device_name: Option<String>,
    sample_rate_hz: u32,
    stream: Option<cpal::Stream>,
}

impl CpalCapture {
    /// `device_name` of `None` selects the host's default input
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            sample_rate_hz: 0,
            stream: None,
        }
    }

    /// Names of the host's input devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| Error::resource(format!("cannot enumerate input devices: {}", e)))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn find_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or_else(|| Error::resource("no audio input device found")),
            Some(name) => host
                .input_devices()
                .map_err(|e| Error::resource(format!("cannot enumerate input devices: {}", e)))?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| Error::resource(format!("input device '{}' not found", name))),
        }
    }
}

impl CaptureBackend for CpalCapture {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        let device = self.find_device()?;
        let supported = device
            .default_input_config()
            .map_err(|e| Error::resource(format!("failed to get input config: {}", e)))?;

        log::info!(
            "capture: {} @ {}Hz, {} channel(s), {:?}",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            supported.sample_rate().0,
            supported.channels(),
            supported.sample_format()
        );

        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let error_sink = sink.clone();
        let on_error = move |err: cpal::StreamError| {
            log::error!("capture stream error: {}", err);
            error_sink.mark_lost();
        };

        let stream = match format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| sink.on_samples(data),
                on_error,
                None,
            ),
            cpal::SampleFormat::I16 => {
                let mut scratch = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        convert_into(data, &mut scratch);
                        sink.on_samples(&scratch);
                    },
                    on_error,
                    None,
                )
            }
            cpal::SampleFormat::U16 => {
                let mut scratch = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        convert_into(data, &mut scratch);
                        sink.on_samples(&scratch);
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(Error::resource(format!(
                    "unsupported input sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| Error::resource(format!("failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::resource(format!("failed to start input stream: {}", e)))?;

        self.sample_rate_hz = config.sample_rate.0;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("capture stream released");
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate_hz
    }
}

fn convert_into<T>(data: &[T], out: &mut Vec<f32>)
where
    T: Sample,
    f32: cpal::FromSample<T>,
{
    out.clear();
    out.extend(data.iter().map(|&s| s.to_sample::<f32>()));
}

/// Plays a WAV file into the sink in real time, looping at the end
pub struct WavCapture {
    path: PathBuf,
    samples: Arc<Vec<f32>>,
    sample_rate_hz: u32,
    channels: u16,
    chunk: Duration,
    running: Arc<AtomicBool>,
    feeder: Option<thread::JoinHandle<()>>,
}

impl WavCapture {
    /// Decode the whole file up front
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = hound::WavReader::open(&path)
            .map_err(|e| Error::resource(format!("cannot open {}: {}", path.display(), e)))?;
        let spec = reader.spec();

        let samples: std::result::Result<Vec<f32>, hound::Error> = match spec.sample_format {
            hound::SampleFormat::Float => reader.into_samples::<f32>().collect(),
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect()
            }
        };
        let samples = samples
            .map_err(|e| Error::resource(format!("cannot decode {}: {}", path.display(), e)))?;

        if samples.is_empty() {
            return Err(Error::resource(format!("{} holds no samples", path.display())));
        }

        log::debug!(
            "loaded {}: {} samples, {}Hz, {} channel(s)",
            path.display(),
            samples.len(),
            spec.sample_rate,
            spec.channels
        );

        Ok(Self {
            path,
            samples: Arc::new(samples),
            sample_rate_hz: spec.sample_rate,
            channels: spec.channels,
            chunk: Duration::from_millis(10),
            running: Arc::new(AtomicBool::new(false)),
            feeder: None,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Interleaved samples pushed per chunk
    fn chunk_len(&self) -> usize {
        let frames = (self.sample_rate_hz as f64 * self.chunk.as_secs_f64()).ceil() as usize;
        (frames * self.channels as usize).max(1)
    }
}

impl CaptureBackend for WavCapture {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        self.stop();

        let samples = Arc::clone(&self.samples);
        let running = Arc::clone(&self.running);
        let chunk_len = self.chunk_len();
        let chunk = self.chunk;
        running.store(true, Ordering::Release);

        log::info!(
            "capture: {} @ {}Hz, {} channel(s)",
            self.path.display(),
            self.sample_rate_hz,
            self.channels
        );

        let feeder = thread::Builder::new()
            .name("wav-capture".into())
            .spawn(move || {
                let mut position = 0;
                while running.load(Ordering::Acquire) {
                    let end = (position + chunk_len).min(samples.len());
                    sink.on_samples(&samples[position..end]);
                    position = if end == samples.len() { 0 } else { end };
                    thread::sleep(chunk);
                }
            })
            .map_err(|e| Error::resource(format!("failed to spawn feeder thread: {}", e)))?;

        self.feeder = Some(feeder);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(feeder) = self.feeder.take() {
            if feeder.join().is_err() {
                log::warn!("wav feeder thread panicked");
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate_hz
    }
}

impl Drop for WavCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: &[f32], channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_sink_pushes_sample_bytes() {
        let ring = Arc::new(RingBuffer::new(64, true));
        let sink = CaptureSink::new(Arc::clone(&ring));

        sink.on_samples(&[0.5, -0.5]);
        assert_eq!(ring.occupancy(), 8);

        let mut out = [0.0f32; 2];
        ring.read(bytemuck::cast_slice_mut(&mut out));
        assert_eq!(out, [0.5, -0.5]);
    }

    #[test]
    fn test_sink_overflow_is_not_fatal() {
        let ring = Arc::new(RingBuffer::new(8, false));
        let sink = CaptureSink::new(Arc::clone(&ring));

        sink.on_samples(&[1.0, 2.0, 3.0]);
        assert_eq!(ring.occupancy(), 8);
        assert!(!sink.is_lost());
    }

    #[test]
    fn test_sink_lost_flag_shared_across_clones() {
        let sink = CaptureSink::new(Arc::new(RingBuffer::new(8, true)));
        let callback_side = sink.clone();
        callback_side.mark_lost();
        assert!(sink.is_lost());
    }

    #[test]
    fn test_wav_capture_feeds_ring() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, &[0.25; 400], 2);

        let mut capture = WavCapture::open(&path).unwrap();
        assert_eq!(capture.sample_rate(), 8_000);
        assert_eq!(capture.channels(), 2);

        let ring = Arc::new(RingBuffer::new(4096, true));
        capture.start(CaptureSink::new(Arc::clone(&ring))).unwrap();
        thread::sleep(Duration::from_millis(50));
        capture.stop();

        assert!(ring.occupancy() > 0);
        let mut out = [0.0f32; 4];
        ring.read(bytemuck::cast_slice_mut(&mut out));
        assert_eq!(out, [0.25; 4]);
    }

    #[test]
    fn test_wav_capture_converts_int_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(16_384i16).unwrap();
        writer.write_sample(-32_768i16).unwrap();
        writer.finalize().unwrap();

        let capture = WavCapture::open(&path).unwrap();
        assert_eq!(capture.samples.as_slice(), &[0.5, -1.0]);
    }

    #[test]
    fn test_wav_capture_missing_file() {
        let err = WavCapture::open("/nonexistent/input.wav").err().unwrap();
        assert!(matches!(err, Error::Resource(_)));
    }
}
