//! Display-side command encoding.
//!
//! Commands share the byte stream with frames. The first byte carries the
//! command code with the two high bits set (`192 + code`), followed by the
//! command's argument bytes.

use std::fmt;

use crate::error::{Error, Result};
use crate::stream::Transport;

/// High bits marking a command byte
pub const COMMAND_FLAG: u8 = 0b1100_0000;

/// Largest code that fits under the flag bits
pub const MAX_COMMAND_CODE: u8 = 63;

/// Most argument bytes a command may carry
pub const MAX_COMMAND_ARGS: usize = 9;

pub const CODE_CLEAR: u8 = 0;

/// How the display colours the streamed buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Single hue; `frosting` whitens low values
    StaticHue { hue: u8, frosting: u8 },
    /// Rainbow spread across the strip
    StaticRainbow { frosting: u8 },
    /// Rainbow scrolling at `rate`
    ScrollingRainbow { rate: u8, frosting: u8 },
}

impl DisplayMode {
    pub fn code(&self) -> u8 {
        match self {
            Self::StaticHue { .. } => 1,
            Self::StaticRainbow { .. } => 2,
            Self::ScrollingRainbow { .. } => 3,
        }
    }

    /// Parse `mode arg...`: mode 2 takes one argument, modes 1 and 3 take two
    pub fn from_args(args: &[u8]) -> Result<Self> {
        match args {
            [1, hue, frosting] => Ok(Self::StaticHue {
                hue: *hue,
                frosting: *frosting,
            }),
            [2, frosting] => Ok(Self::StaticRainbow {
                frosting: *frosting,
            }),
            [3, rate, frosting] => Ok(Self::ScrollingRainbow {
                rate: *rate,
                frosting: *frosting,
            }),
            [mode @ 1..=3, rest @ ..] => Err(Error::config(format!(
                "display mode {} expects {} argument(s), got {}",
                mode,
                if *mode == 2 { 1 } else { 2 },
                rest.len()
            ))),
            [mode, ..] => Err(Error::config(format!("invalid display mode {}", mode))),
            [] => Err(Error::config("missing display mode")),
        }
    }

    pub fn command(&self) -> DeviceCommand {
        let args = match *self {
            Self::StaticHue { hue, frosting } => vec![hue, frosting],
            Self::StaticRainbow { frosting } => vec![frosting],
            Self::ScrollingRainbow { rate, frosting } => vec![rate, frosting],
        };
        DeviceCommand {
            code: self.code(),
            args,
        }
    }
}

/// One command for the display firmware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    pub code: u8,
    pub args: Vec<u8>,
}

impl DeviceCommand {
    pub fn new(code: u8, args: Vec<u8>) -> Result<Self> {
        if code > MAX_COMMAND_CODE {
            return Err(Error::config(format!(
                "command code {} exceeds {}",
                code, MAX_COMMAND_CODE
            )));
        }
        if args.len() > MAX_COMMAND_ARGS {
            return Err(Error::config(format!(
                "command takes at most {} arguments, got {}",
                MAX_COMMAND_ARGS,
                args.len()
            )));
        }
        Ok(Self { code, args })
    }

    /// Blank the display
    pub fn clear() -> Self {
        Self {
            code: CODE_CLEAR,
            args: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.args.len());
        bytes.push(COMMAND_FLAG | self.code);
        bytes.extend_from_slice(&self.args);
        bytes
    }

    pub fn send(&self, transport: &mut dyn Transport) -> Result<()> {
        log::info!("sending device command {}", self);
        transport
            .write_all_bytes(&self.encode())
            .map_err(Error::Transport)
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) metadata length {}",
            self.code,
            COMMAND_FLAG | self.code,
            self.args.len()
        )
    }
}
