//! Per-frame numeric shaping of bucket magnitudes.
//!
//! Stages run in a fixed order: blend → soft normalize by count →
//! exponential attenuation → (optional) soft normalize by maximum.

use crate::params::Tunables;

/// Output ceiling of the attenuation curve
pub const CLIP: f32 = 255.0;

/// Offset of the attenuation curve; sets the near-silent floor
pub const ATTENUATION_OFFSET: f32 = 148.4;

/// Log base (and additive offset) used by count normalization
pub const COUNT_LOG_BASE: f32 = 6.0;

/// Peak value above which maximum normalization starts compressing
const SOFT_MAX_REFERENCE: f32 = 51.0;

/// Lower bound on the maximum-normalization divisor
const SOFT_MAX_MIN_DENOM: f32 = 0.5;

/// Two bucket slots with an explicit "current" index.
///
/// Replaces reference swapping: stages read one slot and write the other,
/// then flip `current`.
#[derive(Debug, Clone)]
pub struct BucketBuffers {
    slots: [Vec<f32>; 2],
    current: usize,
}

impl BucketBuffers {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            slots: [vec![0.0; bucket_count], vec![0.0; bucket_count]],
            current: 0,
        }
    }

    pub fn current(&self) -> &[f32] {
        &self.slots[self.current]
    }

    pub fn current_mut(&mut self) -> &mut [f32] {
        &mut self.slots[self.current]
    }

    /// Previous contents of the current slot (pre-blend values this frame)
    #[cfg(test)]
    fn back(&self) -> &[f32] {
        &self.slots[1 - self.current]
    }

    /// Neighbour smoothing with a flat factor `beta`.
    ///
    /// The current slot becomes the back buffer and the blended values land
    /// in the other slot, which becomes current.
    pub fn blend(&mut self, beta: f32) {
        let back = self.current;
        let front = 1 - back;
        let [a, b] = &mut self.slots;
        let (src, dst) = if back == 0 { (&*a, b) } else { (&*b, a) };
        blend_into(src, dst, beta);
        self.current = front;
    }
}

/// Blend `src` into `dst`.
///
/// Interior buckets: `(β·left + x + β·right) / (1 + 2β)`.
/// Edge buckets use their single neighbour: `(x + β·n) / (1 + β)`.
pub fn blend_into(src: &[f32], dst: &mut [f32], beta: f32) {
    let n = src.len();
    match n {
        0 => {}
        1 => dst[0] = src[0],
        _ => {
            let edge = 1.0 + beta;
            let interior = 1.0 + 2.0 * beta;
            dst[0] = (src[0] + beta * src[1]) / edge;
            dst[n - 1] = (src[n - 1] + beta * src[n - 2]) / edge;
            for i in 1..n - 1 {
                dst[i] = (beta * src[i - 1] + src[i] + beta * src[i + 1]) / interior;
            }
        }
    }
}

/// `x /= log_6(count + 6)`, then `x *= post_gain`.
///
/// Buckets fed by few bins read low next to dense ones; the logarithmic
/// divisor narrows that gap without fully equalizing it.
pub fn soft_normalize_by_count(buckets: &mut [f32], counts: &[u32], post_gain: f32) {
    for (x, &count) in buckets.iter_mut().zip(counts) {
        *x /= (count as f32 + COUNT_LOG_BASE).log(COUNT_LOG_BASE);
        *x *= post_gain;
    }
}

/// Perceptual contrast curve `(255 + A)·exp(x/255 − 1) − A`.
///
/// Monotonic for `x ≥ 0`, leaves a tiny positive floor at 0 and pushes
/// large inputs past the clip ceiling.
pub fn attenuation_curve(x: f32) -> f32 {
    (CLIP + ATTENUATION_OFFSET) * (x / CLIP - 1.0).exp() - ATTENUATION_OFFSET
}

pub fn exponential_attenuation(buckets: &mut [f32]) {
    for x in buckets.iter_mut() {
        *x = attenuation_curve(*x);
    }
}

/// Ceiling-only compression keyed to the frame's own peak.
///
/// `candidate = log2(5)·x / max(log2(peak/51), 0.5)` replaces `x` only when
/// smaller, so no bucket is ever amplified.
pub fn soft_normalize_by_maximum(buckets: &mut [f32]) {
    let peak = buckets.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let denom = (peak / SOFT_MAX_REFERENCE).log2().max(SOFT_MAX_MIN_DENOM);
    let scale = 5.0f32.log2() / denom;

    for x in buckets.iter_mut() {
        let candidate = scale * *x;
        if candidate < *x {
            *x = candidate;
        }
    }
}

/// Shaping state for one analyzer session
#[derive(Debug, Clone)]
pub struct ShapingPipeline {
    buffers: BucketBuffers,
    counts: Vec<u32>,
}

impl ShapingPipeline {
    /// `counts` is the number of transform bins behind each bucket
    pub fn new(counts: &[u32]) -> Self {
        Self {
            buffers: BucketBuffers::new(counts.len()),
            counts: counts.to_vec(),
        }
    }

    /// Slot the bucket source writes into
    pub fn input(&mut self) -> &mut [f32] {
        self.buffers.current_mut()
    }

    /// Run every stage over the current slot
    pub fn run(&mut self, tunables: &Tunables) -> &[f32] {
        self.buffers.blend(tunables.blend);

        let buckets = self.buffers.current_mut();
        soft_normalize_by_count(buckets, &self.counts, tunables.post_gain);
        exponential_attenuation(buckets);
        if tunables.soft_max {
            soft_normalize_by_maximum(buckets);
        }
        self.buffers.current()
    }
}
