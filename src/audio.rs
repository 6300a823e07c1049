//! Audio capture and spectrum analysis.
//!
//! Capture backends push interleaved PCM into a byte ring; the frame loop
//! samples the latest window from it and reduces it to bucket magnitudes.

pub mod capture;
pub mod fft;
pub mod ring_buffer;
pub mod window;

pub use capture::{CaptureBackend, CaptureSink, CpalCapture, WavCapture};
pub use fft::{bucketize, IndexMap, SpectrumAnalyzer};
pub use ring_buffer::{RingBuffer, RingBufferError};
pub use window::WindowSampler;
