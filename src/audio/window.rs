//! Latest-window extraction from the capture ring.

use super::ring_buffer::RingBuffer;
use crate::params::audio_constants::BYTES_PER_SAMPLE;

/// Reads the most recent `N` samples without consuming the stream.
///
/// Each call rewinds the ring's read cursor to `write_cursor - N * 4`
/// (mod capacity) before reading, so consecutive frames see overlapping,
/// possibly repeated windows.
#[derive(Debug, Clone, Copy)]
pub struct WindowSampler {
    sample_count: usize,
}

impl WindowSampler {
    pub fn new(sample_count: usize) -> Self {
        Self { sample_count }
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Fill `out` with the latest window of interleaved `f32` samples.
    ///
    /// `out` must hold exactly `sample_count` samples. Missing data (before
    /// the ring has filled) reads as silence.
    pub fn sample(&self, ring: &RingBuffer, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.sample_count);

        ring.rewind_from_write(self.sample_count * BYTES_PER_SAMPLE);
        ring.read(bytemuck::cast_slice_mut(out));
    }
}
