//! Live tunables adjusted from the control plane while a session runs.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Per-frame shaping and source parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tunables {
    /// Input gain applied to raw samples before the transform / waveform average
    pub pre_gain: f32,

    /// Output gain applied after count normalization
    pub post_gain: f32,

    /// Neighbour weight used by the blend stage (β)
    pub blend: f32,

    /// Enable the peak-keyed ceiling compression stage
    pub soft_max: bool,

    /// Procedural source parameters
    pub noise: NoiseParams,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            pre_gain: 1000.0,
            post_gain: 10.0,
            blend: 0.1,
            soft_max: true,
            noise: NoiseParams::default(),
        }
    }
}

impl Tunables {
    pub fn validate(&self) -> Result<()> {
        if !self.pre_gain.is_finite() || !self.post_gain.is_finite() {
            return Err(Error::config("gains must be finite"));
        }
        if self.blend.is_nan() || self.blend < 0.0 {
            return Err(Error::config(format!("blend must be >= 0, got {}", self.blend)));
        }
        self.noise.validate()
    }
}

/// Coherent-noise parameters for the procedural source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseParams {
    /// Fractal octaves (1-8)
    pub octaves: usize,

    /// Amplitude falloff per octave
    pub persistence: f64,

    /// Noise units per bucket index
    pub x_scale: f64,

    /// Noise units per second of accumulated time
    pub t_scale: f64,

    /// Perlin noise seed
    pub seed: u32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            octaves: 4,
            persistence: 0.5,
            x_scale: 0.05,
            t_scale: 0.5,
            seed: 42,
        }
    }
}

impl NoiseParams {
    pub fn validate(&self) -> Result<()> {
        if !(1..=8).contains(&self.octaves) {
            return Err(Error::config(format!(
                "octaves must be in 1..=8, got {}",
                self.octaves
            )));
        }
        if !self.x_scale.is_finite() || !self.t_scale.is_finite() {
            return Err(Error::config("noise scales must be finite"));
        }
        Ok(())
    }
}

/// Tunables shared between the control plane and the frame loop.
///
/// The loop takes one snapshot per frame, so a setter never tears a frame
/// in flight; it lands on the next frame boundary.
#[derive(Debug, Clone, Default)]
pub struct SharedTunables {
    inner: Arc<Mutex<Tunables>>,
}

impl SharedTunables {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tunables)),
        }
    }

    /// Copy of the current values
    pub fn snapshot(&self) -> Tunables {
        *self.inner.lock()
    }

    pub fn set_pre_gain(&self, gain: f32) {
        self.inner.lock().pre_gain = gain;
    }

    pub fn set_post_gain(&self, gain: f32) {
        self.inner.lock().post_gain = gain;
    }

    pub fn set_blend(&self, blend: f32) {
        self.inner.lock().blend = blend;
    }

    pub fn set_soft_max(&self, enabled: bool) {
        self.inner.lock().soft_max = enabled;
    }

    pub fn set_noise(&self, noise: NoiseParams) {
        self.inner.lock().noise = noise;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_visible_in_next_snapshot() {
        let shared = SharedTunables::default();
        let before = shared.snapshot();

        shared.set_pre_gain(5.0);
        shared.set_blend(0.25);
        shared.set_soft_max(false);

        // Earlier snapshot is a copy and stays untouched
        assert_eq!(before, Tunables::default());

        let after = shared.snapshot();
        assert_eq!(after.pre_gain, 5.0);
        assert_eq!(after.blend, 0.25);
        assert!(!after.soft_max);
        assert_eq!(after.post_gain, 10.0);
    }

    #[test]
    fn test_validate() {
        assert!(Tunables::default().validate().is_ok());

        let bad = Tunables {
            blend: -1.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = NoiseParams {
            octaves: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
