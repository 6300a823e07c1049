//! Analyzer session configuration and constants.

use std::time::Duration;

use crate::error::{Error, Result};

/// Analyzer session configuration (read once when a session starts)
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Capture sample rate (Hz)
    pub sample_rate_hz: u32,

    /// FFT window size in samples (power of 2)
    /// 16384 @ 48kHz ≈ 2.93 Hz per bin
    pub sample_count: usize,

    /// Frames streamed per second
    pub frame_rate_hz: u32,

    /// Lowest analyzed frequency (Hz), bins below are dropped
    pub min_frequency_hz: f32,

    /// Highest analyzed frequency (Hz)
    /// Only bins up to max/2 feed the buckets
    pub max_frequency_hz: f32,

    /// Output channels (LEDs) per frame
    pub bucket_count: usize,

    /// Raw samples averaged into buckets by the waveform source
    pub waveform_sample_count: usize,

    /// Ring buffer length (seconds of interleaved capture)
    pub buffer_seconds: f32,

    /// Interleaved channels delivered by the capture collaborator
    pub channels: u16,

    /// Drop the newest bytes on overflow instead of reporting an error
    pub discard_on_overflow: bool,

    /// Delay between capture start and the first frame
    pub warm_up: Duration,

    /// Grace period `stop()` waits for the loop to notice the cleared flag
    pub stop_grace: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 48_000,
            sample_count: 16_384,
            frame_rate_hz: 60,
            min_frequency_hz: 20.0,
            max_frequency_hz: 16_000.0,
            bucket_count: 60,
            waveform_sample_count: 6_000,
            buffer_seconds: 2.0,
            channels: 2,
            discard_on_overflow: true,
            warm_up: Duration::from_secs(1),
            stop_grace: Duration::from_millis(100),
        }
    }
}

impl AnalyzerConfig {
    /// Width of one transform bin (Hz)
    pub fn frequency_resolution(&self) -> f32 {
        self.sample_rate_hz as f32 / self.sample_count as f32
    }

    /// Convert frequency (Hz) to FFT bin index (floor)
    pub fn hz_to_bin(&self, hz: f32) -> usize {
        (hz / self.frequency_resolution()) as usize
    }

    /// Number of bins mapped onto buckets (`L`)
    pub fn last_index(&self) -> usize {
        self.hz_to_bin(self.max_frequency_hz / 2.0)
    }

    /// Bins skipped at the bottom of the spectrum (sub-audible content)
    pub fn frequency_offset(&self) -> usize {
        self.hz_to_bin(self.min_frequency_hz)
    }

    /// Bytes covered by one analysis window
    pub fn window_bytes(&self) -> usize {
        self.sample_count * audio_constants::BYTES_PER_SAMPLE
    }

    /// Ring buffer capacity in bytes
    pub fn ring_capacity(&self) -> usize {
        (self.buffer_seconds
            * self.sample_rate_hz as f32
            * self.channels as f32
            * audio_constants::BYTES_PER_SAMPLE as f32) as usize
    }

    /// Target duration of one frame
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz as f64)
    }

    /// Wire frame length: buckets plus two sentinels
    pub fn frame_len(&self) -> usize {
        self.bucket_count + 2
    }

    /// Validate configuration before a session starts
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz == 0 {
            return Err(Error::config("sample rate must be > 0"));
        }
        if self.frame_rate_hz == 0 {
            return Err(Error::config("frame rate must be > 0"));
        }
        if self.bucket_count == 0 {
            return Err(Error::config("bucket count must be > 0"));
        }
        if self.sample_count < 2 {
            return Err(Error::config("sample count must be at least 2"));
        }
        if self.min_frequency_hz < 0.0 || self.min_frequency_hz >= self.max_frequency_hz {
            return Err(Error::config(format!(
                "frequency range {}..{} Hz is empty",
                self.min_frequency_hz, self.max_frequency_hz
            )));
        }
        if self.max_frequency_hz > self.sample_rate_hz as f32 {
            return Err(Error::config(format!(
                "max frequency {} Hz exceeds sample rate {} Hz",
                self.max_frequency_hz, self.sample_rate_hz
            )));
        }
        if self.last_index() == 0 {
            return Err(Error::config(
                "max frequency maps to no transform bins at this resolution",
            ));
        }
        if self.last_index() + self.frequency_offset() > self.sample_count / 2 {
            return Err(Error::config(format!(
                "bins {}..{} extend past the Nyquist bin {}",
                self.frequency_offset(),
                self.last_index() + self.frequency_offset(),
                self.sample_count / 2
            )));
        }
        if self.waveform_sample_count < self.bucket_count {
            return Err(Error::config(format!(
                "waveform window ({}) must cover every bucket ({})",
                self.waveform_sample_count, self.bucket_count
            )));
        }
        if self.channels == 0 {
            return Err(Error::config("channel count must be > 0"));
        }
        let window = self
            .window_bytes()
            .max(self.waveform_sample_count * audio_constants::BYTES_PER_SAMPLE);
        if self.ring_capacity() <= window {
            return Err(Error::config(format!(
                "ring buffer ({} bytes) must exceed the analysis window ({} bytes)",
                self.ring_capacity(),
                window
            )));
        }
        Ok(())
    }
}

/// Audio constants (compile-time, fixed by the capture format)
pub mod audio_constants {
    /// Interleaved 32-bit float PCM
    pub const BYTES_PER_SAMPLE: usize = 4;
}
