//! Session error taxonomy.
//!
//! Every variant is fatal to the running analyzer session. The frame loop
//! stops and nothing is retried; `Analyzer::poll` or `Analyzer::stop` then
//! releases capture and returns the error.

use std::io;

use thiserror::Error;

/// Errors that end an analyzer session
#[derive(Debug, Error)]
pub enum Error {
    /// Missing transport or an invalid parameter set
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Capture device unavailable, failed to start, or lost mid-session
    #[error("audio resource error: {0}")]
    Resource(String),

    /// Frame or command write to the transport failed
    #[error("transport write failed: {0}")]
    Transport(#[source] io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
