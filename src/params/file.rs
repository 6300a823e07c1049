//! Optional TOML configuration file.
//!
//! Every key is optional; present keys override the built-in defaults and
//! are in turn overridden by command-line flags.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::{AnalyzerConfig, Tunables};
use crate::error::{Error, Result};

/// Example file written by `--print-config`
pub const CONFIG_TEMPLATE: &str = r#"# spectra configuration file

[analyzer]
# sample_rate_hz = 48000
# sample_count = 16384          # FFT window (power of 2)
# frame_rate_hz = 60
# min_frequency_hz = 20.0
# max_frequency_hz = 16000.0
# bucket_count = 60             # LEDs on the strip
# waveform_sample_count = 6000
# buffer_seconds = 2.0
# channels = 2
# discard_on_overflow = true
# warm_up_ms = 1000
# stop_grace_ms = 100

[tunables]
# pre_gain = 1000.0
# post_gain = 10.0
# blend = 0.1
# soft_max = true

[noise]
# octaves = 4
# persistence = 0.5
# x_scale = 0.05
# t_scale = 0.5
# seed = 42
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub analyzer: AnalyzerSection,
    #[serde(default)]
    pub tunables: TunablesSection,
    #[serde(default)]
    pub noise: NoiseSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzerSection {
    pub sample_rate_hz: Option<u32>,
    pub sample_count: Option<usize>,
    pub frame_rate_hz: Option<u32>,
    pub min_frequency_hz: Option<f32>,
    pub max_frequency_hz: Option<f32>,
    pub bucket_count: Option<usize>,
    pub waveform_sample_count: Option<usize>,
    pub buffer_seconds: Option<f32>,
    pub channels: Option<u16>,
    pub discard_on_overflow: Option<bool>,
    pub warm_up_ms: Option<u64>,
    pub stop_grace_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunablesSection {
    pub pre_gain: Option<f32>,
    pub post_gain: Option<f32>,
    pub blend: Option<f32>,
    pub soft_max: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoiseSection {
    pub octaves: Option<usize>,
    pub persistence: Option<f64>,
    pub x_scale: Option<f64>,
    pub t_scale: Option<f64>,
    pub seed: Option<u32>,
}

impl ConfigFile {
    /// Load and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay the keys present in this file onto `config` and `tunables`
    pub fn apply(&self, config: &mut AnalyzerConfig, tunables: &mut Tunables) {
        let a = &self.analyzer;
        if let Some(v) = a.sample_rate_hz {
            config.sample_rate_hz = v;
        }
        if let Some(v) = a.sample_count {
            config.sample_count = v;
        }
        if let Some(v) = a.frame_rate_hz {
            config.frame_rate_hz = v;
        }
        if let Some(v) = a.min_frequency_hz {
            config.min_frequency_hz = v;
        }
        if let Some(v) = a.max_frequency_hz {
            config.max_frequency_hz = v;
        }
        if let Some(v) = a.bucket_count {
            config.bucket_count = v;
        }
        if let Some(v) = a.waveform_sample_count {
            config.waveform_sample_count = v;
        }
        if let Some(v) = a.buffer_seconds {
            config.buffer_seconds = v;
        }
        if let Some(v) = a.channels {
            config.channels = v;
        }
        if let Some(v) = a.discard_on_overflow {
            config.discard_on_overflow = v;
        }
        if let Some(ms) = a.warm_up_ms {
            config.warm_up = Duration::from_millis(ms);
        }
        if let Some(ms) = a.stop_grace_ms {
            config.stop_grace = Duration::from_millis(ms);
        }

        let t = &self.tunables;
        if let Some(v) = t.pre_gain {
            tunables.pre_gain = v;
        }
        if let Some(v) = t.post_gain {
            tunables.post_gain = v;
        }
        if let Some(v) = t.blend {
            tunables.blend = v;
        }
        if let Some(v) = t.soft_max {
            tunables.soft_max = v;
        }

        let n = &self.noise;
        if let Some(v) = n.octaves {
            tunables.noise.octaves = v;
        }
        if let Some(v) = n.persistence {
            tunables.noise.persistence = v;
        }
        if let Some(v) = n.x_scale {
            tunables.noise.x_scale = v;
        }
        if let Some(v) = n.t_scale {
            tunables.noise.t_scale = v;
        }
        if let Some(v) = n.seed {
            tunables.noise.seed = v;
        }
    }
}
