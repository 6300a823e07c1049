//! Bucket sources: the per-frame producers of raw bucket values.
//!
//! Spectrum mode reduces the latest audio window to log-spaced magnitude
//! buckets and feeds the shaping pipeline. Waveform and procedural modes
//! write display-ready values that go to the frame unshaped.

use std::fmt;
use std::sync::Arc;

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use crate::audio::{RingBuffer, SpectrumAnalyzer, WindowSampler};
use crate::error::{Error, Result};
use crate::params::{AnalyzerConfig, NoiseParams, Tunables};
use crate::shaping::CLIP;

/// What the analyzer streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Log-bucketed spectrum of the captured audio
    Spectrum,
    /// Chunk averages of the raw captured samples
    Waveform,
    /// Animated coherent noise, no audio input
    Procedural,
}

impl Mode {
    /// Whether frames pass through the shaping pipeline
    pub fn shapes(&self) -> bool {
        matches!(self, Self::Spectrum)
    }

    /// Whether the mode reads from an audio capture
    pub fn needs_capture(&self) -> bool {
        !matches!(self, Self::Procedural)
    }

    /// Build this mode's source; capture modes require `ring`
    pub fn build_source(
        &self,
        config: &AnalyzerConfig,
        ring: Option<Arc<RingBuffer>>,
    ) -> Result<Box<dyn BucketSource>> {
        let source: Box<dyn BucketSource> = match (self, ring) {
            (Self::Procedural, _) => Box::new(ProceduralSource::new(config)),
            (Self::Spectrum, Some(ring)) => Box::new(SpectrumSource::new(config, ring)),
            (Self::Waveform, Some(ring)) => Box::new(WaveformSource::new(config, ring)),
            (mode, None) => {
                return Err(Error::config(format!("{} mode needs an audio capture", mode)))
            }
        };
        Ok(source)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spectrum => "spectrum",
            Self::Waveform => "waveform",
            Self::Procedural => "procedural",
        };
        f.write_str(name)
    }
}

/// Produces one frame's raw bucket values
pub trait BucketSource: Send {
    /// Overwrite every slot of `out` (length `B`)
    fn fill(&mut self, tunables: &Tunables, out: &mut [f32]);
}

/// Window → transform → bucket sums
pub struct SpectrumSource {
    ring: Arc<RingBuffer>,
    sampler: WindowSampler,
    analyzer: SpectrumAnalyzer,
    window: Vec<f32>,
}

impl SpectrumSource {
    pub fn new(config: &AnalyzerConfig, ring: Arc<RingBuffer>) -> Self {
        Self {
            ring,
            sampler: WindowSampler::new(config.sample_count),
            analyzer: SpectrumAnalyzer::new(config),
            window: vec![0.0; config.sample_count],
        }
    }
}

impl BucketSource for SpectrumSource {
    fn fill(&mut self, tunables: &Tunables, out: &mut [f32]) {
        self.sampler.sample(&self.ring, &mut self.window);
        self.analyzer.transform(&self.window, tunables.pre_gain);
        self.analyzer.bucketize(out);
    }
}

/// Mean of `W/B` consecutive raw samples per bucket, scaled by pre-gain
pub struct WaveformSource {
    ring: Arc<RingBuffer>,
    sampler: WindowSampler,
    window: Vec<f32>,
}

impl WaveformSource {
    pub fn new(config: &AnalyzerConfig, ring: Arc<RingBuffer>) -> Self {
        Self {
            ring,
            sampler: WindowSampler::new(config.waveform_sample_count),
            window: vec![0.0; config.waveform_sample_count],
        }
    }
}

impl BucketSource for WaveformSource {
    fn fill(&mut self, tunables: &Tunables, out: &mut [f32]) {
        self.sampler.sample(&self.ring, &mut self.window);
        chunk_means(&self.window, tunables.pre_gain, out);
    }
}

/// Average `samples` into `out.len()` equal chunks; trailing samples that
/// do not fill a chunk are ignored. Negative means clamp to 0.
pub fn chunk_means(samples: &[f32], gain: f32, out: &mut [f32]) {
    let chunk = samples.len() / out.len().max(1);
    if chunk == 0 {
        out.fill(0.0);
        return;
    }
    for (slot, values) in out.iter_mut().zip(samples.chunks_exact(chunk)) {
        let mean = values.iter().sum::<f32>() / chunk as f32;
        *slot = (mean * gain).max(0.0);
    }
}

/// Fractal Perlin noise scrolled through time
pub struct ProceduralSource {
    fbm: Fbm<Perlin>,
    params: NoiseParams,
    /// Accumulated session time (seconds)
    time_s: f64,
    frame_period_s: f64,
}

impl ProceduralSource {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let params = NoiseParams::default();
        Self {
            fbm: build_fbm(&params),
            params,
            time_s: 0.0,
            frame_period_s: 1.0 / config.frame_rate_hz as f64,
        }
    }

    pub fn time_s(&self) -> f64 {
        self.time_s
    }
}

impl BucketSource for ProceduralSource {
    fn fill(&mut self, tunables: &Tunables, out: &mut [f32]) {
        if tunables.noise != self.params {
            self.params = tunables.noise;
            self.fbm = build_fbm(&self.params);
        }

        let t = self.time_s * self.params.t_scale;
        for (i, slot) in out.iter_mut().enumerate() {
            let value = self.fbm.get([i as f64 * self.params.x_scale, t]);
            let u = ((value + 1.0) / 2.0).clamp(0.0, 1.0);
            *slot = smoothstep(u) as f32 * CLIP;
        }
        self.time_s += self.frame_period_s;
    }
}

fn build_fbm(params: &NoiseParams) -> Fbm<Perlin> {
    Fbm::<Perlin>::new(params.seed)
        .set_octaves(params.octaves)
        .set_persistence(params.persistence)
}

/// Cubic ease `u²(3 − 2u)` on `[0, 1]`
pub fn smoothstep(u: f64) -> f64 {
    u * u * (3.0 - 2.0 * u)
}
