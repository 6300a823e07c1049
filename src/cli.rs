//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};
use crate::params::{AnalyzerConfig, ConfigFile, Tunables};
use crate::sources::Mode;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "spectra")]
#[command(about = "Audio-reactive LED spectrum streamer", long_about = None)]
pub struct Args {
    /// TOML configuration file (every key optional)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print a configuration template and exit
    #[arg(long)]
    pub print_config: bool,

    /// Serial device, FIFO or file the frames are written to
    #[arg(long, value_name = "PATH")]
    pub port: Option<PathBuf>,

    /// Play a WAV file instead of capturing live input
    #[arg(long, value_name = "PATH", conflicts_with = "device")]
    pub wav: Option<PathBuf>,

    /// Input device name (host default when omitted)
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// List input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Run one mode without the interactive prompt
    #[arg(long, value_enum, requires = "port")]
    pub mode: Option<Mode>,

    /// Display mode and its arguments sent before `--mode` starts
    #[arg(long, value_name = "MODE,ARGS", value_delimiter = ',', default_value = "2,0")]
    pub display: Vec<u8>,

    /// Stop `--mode` after this many seconds (runs until the session ends otherwise)
    #[arg(long, value_name = "SECONDS", requires = "mode")]
    pub seconds: Option<f32>,

    /// Frames per second
    #[arg(long, value_name = "HZ")]
    pub frame_rate: Option<u32>,

    /// Buckets (LEDs) per frame
    #[arg(long, value_name = "COUNT")]
    pub buckets: Option<usize>,

    /// Input gain before the transform
    #[arg(long, value_name = "FACTOR")]
    pub pre_gain: Option<f32>,

    /// Output gain after count normalization
    #[arg(long, value_name = "FACTOR")]
    pub post_gain: Option<f32>,

    /// Neighbour blend factor
    #[arg(long, value_name = "FACTOR")]
    pub blend: Option<f32>,

    /// Disable peak-keyed ceiling compression
    #[arg(long)]
    pub no_soft_max: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Default log filter for env_logger
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Defaults, then the config file, then command-line overrides
    pub fn load_settings(&self) -> Result<(AnalyzerConfig, Tunables)> {
        let mut config = AnalyzerConfig::default();
        let mut tunables = Tunables::default();

        if let Some(path) = &self.config {
            ConfigFile::load(path)?.apply(&mut config, &mut tunables);
            log::debug!("loaded configuration from {}", path.display());
        }
        self.apply_overrides(&mut config, &mut tunables);

        if let Some(seconds) = self.seconds {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(Error::config(format!(
                    "--seconds must be a non-negative number, got {}",
                    seconds
                )));
            }
        }
        config.validate()?;
        tunables.validate()?;
        Ok((config, tunables))
    }

    fn apply_overrides(&self, config: &mut AnalyzerConfig, tunables: &mut Tunables) {
        if let Some(rate) = self.frame_rate {
            config.frame_rate_hz = rate;
        }
        if let Some(buckets) = self.buckets {
            config.bucket_count = buckets;
        }
        if let Some(gain) = self.pre_gain {
            tunables.pre_gain = gain;
        }
        if let Some(gain) = self.post_gain {
            tunables.post_gain = gain;
        }
        if let Some(blend) = self.blend {
            tunables.blend = blend;
        }
        if self.no_soft_max {
            tunables.soft_max = false;
        }
    }
}
