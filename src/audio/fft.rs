//! Spectrum analysis: transform, logarithmic index map and bucketing.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::params::AnalyzerConfig;

/// Base of the bin → bucket logarithm
pub const LOG_BASE: f64 = 4.0;

/// Bin divisor inside the logarithm; larger values flatten the low end
pub const LOG_DENOMINATOR: f64 = 6.7;

/// Precomputed transform-bin → bucket mapping.
///
/// `bucket(i) = floor(B * log_b(1 + i/d) / log_b(1 + L/d))` for `i` in `[0, L)`.
/// Low bins spread across many buckets, high bins collapse into few.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMap {
    map: Vec<usize>,
    counts: Vec<u32>,
}

impl IndexMap {
    /// Build the map for `last_index` bins onto `bucket_count` buckets
    pub fn build(last_index: usize, bucket_count: usize) -> Self {
        let max_log = (1.0 + last_index as f64 / LOG_DENOMINATOR).log(LOG_BASE);
        let mut map = Vec::with_capacity(last_index);
        let mut counts = vec![0u32; bucket_count];

        for i in 0..last_index {
            let ratio = (1.0 + i as f64 / LOG_DENOMINATOR).log(LOG_BASE) / max_log;
            // i < L keeps the ratio below 1; the clamp guards float rounding
            let bucket = ((bucket_count as f64 * ratio) as usize).min(bucket_count - 1);
            map.push(bucket);
            counts[bucket] += 1;
        }

        Self { map, counts }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::build(config.last_index(), config.bucket_count)
    }

    /// Bucket index for every usable bin (length `L`)
    pub fn map(&self) -> &[usize] {
        &self.map
    }

    /// Number of bins aggregated into each bucket
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn last_index(&self) -> usize {
        self.map.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.counts.len()
    }
}

/// Gain → FFT → magnitude → bucket sums
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    index_map: IndexMap,
    frequency_offset: usize,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Magnitudes of the first `L + offset` bins
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.sample_count);
        let index_map = IndexMap::from_config(config);
        let frequency_offset = config.frequency_offset();
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        log::debug!(
            "index map: {} bins (offset {}) onto {} buckets, counts {:?}",
            index_map.last_index(),
            frequency_offset,
            index_map.bucket_count(),
            index_map.counts()
        );

        Self {
            fft,
            frequency_offset,
            buffer: vec![Complex::new(0.0, 0.0); config.sample_count],
            scratch,
            magnitudes: vec![0.0; index_map.last_index() + frequency_offset],
            index_map,
        }
    }

    pub fn index_map(&self) -> &IndexMap {
        &self.index_map
    }

    pub fn frequency_offset(&self) -> usize {
        self.frequency_offset
    }

    /// Apply `pre_gain`, run the forward FFT and keep the used magnitudes.
    ///
    /// Only the lower half of a real signal's spectrum is unique, and only
    /// the first `L + offset` bins of it feed the buckets.
    pub fn transform(&mut self, samples: &[f32], pre_gain: f32) -> &[f32] {
        for (slot, &sample) in self.buffer.iter_mut().zip(samples) {
            *slot = Complex::new(sample * pre_gain, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (mag, bin) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *mag = bin.norm();
        }
        &self.magnitudes
    }

    /// Sum bin magnitudes into buckets; no averaging here
    pub fn bucketize(&self, out: &mut [f32]) {
        bucketize(
            &self.magnitudes,
            &self.index_map,
            self.frequency_offset,
            out,
        );
    }
}

/// `out[map[i]] += spectrum[i + offset]` for every mapped bin
pub fn bucketize(spectrum: &[f32], index_map: &IndexMap, offset: usize, out: &mut [f32]) {
    out.fill(0.0);
    for (i, &bucket) in index_map.map().iter().enumerate() {
        out[bucket] += spectrum[i + offset];
    }
}
