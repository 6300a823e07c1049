//! Spectra library - Audio-reactive LED frame streaming
//!
//! Captured audio is reduced each frame to a small vector of log-spaced
//! spectrum buckets, shaped for display and written to a byte-stream
//! transport as sentinel-framed packets.

pub mod analyzer;
pub mod audio;
pub mod cli;
pub mod controller;
pub mod device;
pub mod error;
pub mod params;
pub mod shaping;
pub mod sources;
pub mod stream;

pub use analyzer::{Analyzer, State};
pub use error::{Error, Result};
pub use sources::Mode;
