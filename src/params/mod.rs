//! Parameter definitions with physical units and documented semantics.
//!
//! All tuned constants are collected here with:
//! - Physical units (Hz, seconds, samples)
//! - Documented ranges and meanings
//! - Validation before a session starts

mod audio;
mod file;
mod tunables;

// Re-export all types
pub use audio::{audio_constants, AnalyzerConfig};
pub use file::{ConfigFile, CONFIG_TEMPLATE};
pub use tunables::{NoiseParams, SharedTunables, Tunables};
