//! Interactive control plane: a static command registry over the analyzer.
//!
//! Each line is `name arg...`. Commands set tunables, bind the transport,
//! send raw device commands and start or stop analyzer sessions.

use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::analyzer::Analyzer;
use crate::device::{DeviceCommand, DisplayMode};
use crate::params::{NoiseParams, Tunables};
use crate::sources::Mode;

/// Pause after each device command so the display can act on it
pub const COMMAND_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid command '{0}'; run 'h' to see valid commands")]
    Unknown(String),

    #[error("'{name}' takes {min}..={max} arguments, got {got}")]
    ArgCount {
        name: &'static str,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument { arg: String, reason: String },

    #[error("failed to open {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Spectra(#[from] crate::Error),
}

type Handler = fn(&mut Controller, &[&str]) -> Result<String, CommandError>;

/// One registry entry
pub struct CommandSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub usage: &'static str,
    handler: Handler,
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "h",
        min_args: 0,
        max_args: 1,
        usage: "Help: h {command: name?}",
        handler: Controller::help,
    },
    CommandSpec {
        name: "pr",
        min_args: 0,
        max_args: 1,
        usage: "PreGain: pr {factor: float? = 1000}",
        handler: Controller::pre_gain,
    },
    CommandSpec {
        name: "po",
        min_args: 0,
        max_args: 1,
        usage: "PostGain: po {factor: float? = 10}",
        handler: Controller::post_gain,
    },
    CommandSpec {
        name: "bl",
        min_args: 0,
        max_args: 1,
        usage: "Blend: bl {factor: float? = 0.1}",
        handler: Controller::blend,
    },
    CommandSpec {
        name: "sm",
        min_args: 0,
        max_args: 1,
        usage: "SoftMax: sm {on|off?} (no argument toggles)",
        handler: Controller::soft_max,
    },
    CommandSpec {
        name: "c",
        min_args: 0,
        max_args: 1,
        usage: "Connect: c {device path: string? = --port}",
        handler: Controller::connect,
    },
    CommandSpec {
        name: "d",
        min_args: 0,
        max_args: 0,
        usage: "Disconnect: d",
        handler: Controller::disconnect,
    },
    CommandSpec {
        name: "ca",
        min_args: 1,
        max_args: 10,
        usage: "Command device: ca {code: int!} {arg: int?} ...
    0 = clear (use 'cl')
  1-3 = display mode (use 'sp', 'wv' or 'pl')
   10 = static hue breathing // hue // breathing speed [1-255] // max brightness
   11 = rotating hue breathing // hue rotation speed // breathing speed // max brightness",
        handler: Controller::command_device,
    },
    CommandSpec {
        name: "sp",
        min_args: 2,
        max_args: 3,
        usage: "Spectrum: sp {display mode: int!} {arg2: int!} {arg3: int?}
    1 = static hue // hue // frosting
    2 = static rainbow // frosting
    3 = scrolling rainbow // scroll rate // frosting",
        handler: Controller::spectrum,
    },
    CommandSpec {
        name: "wv",
        min_args: 2,
        max_args: 3,
        usage: "Waveform: wv {display mode: int!} {arg2: int!} {arg3: int?}
    display modes as for 'sp'",
        handler: Controller::waveform,
    },
    CommandSpec {
        name: "pl",
        min_args: 2,
        max_args: 6,
        usage: "Perlin: pl {display mode: int!} {arg2: int!} {arg3: int?} {octaves: 1-8?} {x scale: float?} {t scale: float?}
    display modes as for 'sp'; noise parameters need all six arguments
    (mode 2 takes a placeholder 0 as arg3)",
        handler: Controller::procedural,
    },
    CommandSpec {
        name: "cl",
        min_args: 0,
        max_args: 0,
        usage: "Clear: cl (stop the session and blank the display)",
        handler: Controller::clear,
    },
    CommandSpec {
        name: "q",
        min_args: 0,
        max_args: 0,
        usage: "Quit: q",
        handler: Controller::quit,
    },
];

/// Find a command by name
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}

pub struct Controller {
    analyzer: Analyzer,
    default_port: Option<PathBuf>,
    settle: Duration,
    quit: bool,
}

impl Controller {
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            default_port: None,
            settle: COMMAND_SETTLE,
            quit: false,
        }
    }

    /// Device path used by `c` without arguments and by mode commands
    /// when nothing is bound yet
    pub fn with_default_port(mut self, port: Option<PathBuf>) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn analyzer_mut(&mut self) -> &mut Analyzer {
        &mut self.analyzer
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Parse and run one command line; blank lines do nothing
    pub fn execute(&mut self, line: &str) -> Result<String, CommandError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(String::new());
        };
        let args: Vec<&str> = words.collect();

        let spec = lookup(name).ok_or_else(|| CommandError::Unknown(name.to_string()))?;
        if args.len() < spec.min_args || args.len() > spec.max_args {
            return Err(CommandError::ArgCount {
                name: spec.name,
                min: spec.min_args,
                max: spec.max_args,
                got: args.len(),
            });
        }
        (spec.handler)(self, &args)
    }

    /// Read commands until `q` or end of input
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        writeln!(output, "------ spectra controller ------")?;
        let mut lines = input.lines();

        while !self.quit {
            write!(output, ">> ")?;
            output.flush()?;
            let Some(line) = lines.next() else {
                break;
            };
            let line = line?;

            match self.execute(&line) {
                Ok(reply) if reply.is_empty() => {}
                Ok(reply) => writeln!(output, "{}", reply)?,
                Err(e) => writeln!(output, "{}", e)?,
            }
            if let Err(e) = self.analyzer.poll() {
                writeln!(output, "session ended: {}", e)?;
            }
        }

        if let Err(e) = self.analyzer.stop() {
            writeln!(output, "session ended: {}", e)?;
        }
        Ok(())
    }

    fn help(&mut self, args: &[&str]) -> Result<String, CommandError> {
        match args.first() {
            None => {
                let usages: Vec<&str> = COMMANDS.iter().map(|spec| spec.usage).collect();
                Ok(usages.join("\n\n"))
            }
            Some(name) => lookup(name)
                .map(|spec| spec.usage.to_string())
                .ok_or_else(|| CommandError::Unknown(name.to_string())),
        }
    }

    fn pre_gain(&mut self, args: &[&str]) -> Result<String, CommandError> {
        let gain = parse_or(args, Tunables::default().pre_gain)?;
        finite(args, gain)?;
        self.analyzer.tunables().set_pre_gain(gain);
        Ok(format!("pre-gain: {}", gain))
    }

    fn post_gain(&mut self, args: &[&str]) -> Result<String, CommandError> {
        let gain = parse_or(args, Tunables::default().post_gain)?;
        finite(args, gain)?;
        self.analyzer.tunables().set_post_gain(gain);
        Ok(format!("post-gain: {}", gain))
    }

    fn blend(&mut self, args: &[&str]) -> Result<String, CommandError> {
        let blend: f32 = parse_or(args, Tunables::default().blend)?;
        if blend.is_nan() || blend < 0.0 {
            return Err(invalid(args[0], "blend must be >= 0"));
        }
        self.analyzer.tunables().set_blend(blend);
        Ok(format!("blend: {}", blend))
    }

    fn soft_max(&mut self, args: &[&str]) -> Result<String, CommandError> {
        let tunables = self.analyzer.tunables();
        let enabled = match args.first() {
            None => !tunables.snapshot().soft_max,
            Some(&"on") => true,
            Some(&"off") => false,
            Some(other) => return Err(invalid(other, "expected 'on' or 'off'")),
        };
        tunables.set_soft_max(enabled);
        Ok(format!("soft max: {}", if enabled { "on" } else { "off" }))
    }

    fn connect(&mut self, args: &[&str]) -> Result<String, CommandError> {
        let path = match args.first() {
            Some(path) => PathBuf::from(path),
            None => self
                .default_port
                .clone()
                .ok_or_else(|| crate::Error::config("no device path given and no --port set"))?,
        };
        self.bind(&path)?;
        Ok(format!("opened {}", path.display()))
    }

    fn bind(&mut self, path: &Path) -> Result<(), CommandError> {
        let port = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| CommandError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        self.analyzer.bind_transport(port);
        log::info!("transport bound to {}", path.display());
        Ok(())
    }

    fn disconnect(&mut self, _args: &[&str]) -> Result<String, CommandError> {
        if self.analyzer.unbind_transport() {
            Ok("disconnected".to_string())
        } else {
            Err(crate::Error::config("no transport bound").into())
        }
    }

    fn command_device(&mut self, args: &[&str]) -> Result<String, CommandError> {
        let bytes = parse_bytes(args)?;
        let command = DeviceCommand::new(bytes[0], bytes[1..].to_vec())?;
        self.send(&command)?;
        Ok(format!("sent command {}", command))
    }

    fn spectrum(&mut self, args: &[&str]) -> Result<String, CommandError> {
        let display = DisplayMode::from_args(&parse_bytes(args)?)?;
        self.start_mode(Mode::Spectrum, display)
    }

    fn waveform(&mut self, args: &[&str]) -> Result<String, CommandError> {
        let display = DisplayMode::from_args(&parse_bytes(args)?)?;
        self.start_mode(Mode::Waveform, display)
    }

    fn procedural(&mut self, args: &[&str]) -> Result<String, CommandError> {
        if args.len() < 6 {
            let display = DisplayMode::from_args(&parse_bytes(args)?)?;
            return self.start_mode(Mode::Procedural, display);
        }

        // Mode 2 carries a placeholder third argument in this form
        let display_args = if args[0] == "2" { &args[..2] } else { &args[..3] };
        let display = DisplayMode::from_args(&parse_bytes(display_args)?)?;

        let noise = NoiseParams {
            octaves: parse(args[3])?,
            x_scale: parse(args[4])?,
            t_scale: parse(args[5])?,
            ..self.analyzer.tunables().snapshot().noise
        };
        noise.validate()?;
        self.analyzer.tunables().set_noise(noise);

        self.start_mode(Mode::Procedural, display)
    }

    fn clear(&mut self, _args: &[&str]) -> Result<String, CommandError> {
        let stopped = self.analyzer.stop();
        if self.analyzer.is_bound() {
            self.send(&DeviceCommand::clear())?;
        }
        stopped?;
        Ok("cleared".to_string())
    }

    fn quit(&mut self, _args: &[&str]) -> Result<String, CommandError> {
        self.quit = true;
        self.analyzer.stop()?;
        Ok(String::new())
    }

    /// Stop any running session, set the display mode, then start `mode`
    pub fn start_mode(&mut self, mode: Mode, display: DisplayMode) -> Result<String, CommandError> {
        if !self.analyzer.is_bound() {
            let port = self
                .default_port
                .clone()
                .ok_or_else(|| crate::Error::config("no transport bound; connect with 'c' first"))?;
            self.bind(&port)?;
        }

        if let Err(e) = self.analyzer.stop() {
            log::warn!("previous session ended with error: {}", e);
        }
        self.send(&display.command())?;
        self.analyzer.start(mode)?;
        Ok(format!("{} mode running", mode))
    }

    fn send(&mut self, command: &DeviceCommand) -> Result<(), CommandError> {
        self.analyzer.send_command(command)?;
        thread::sleep(self.settle);
        Ok(())
    }
}

fn invalid(arg: &str, reason: impl Into<String>) -> CommandError {
    CommandError::InvalidArgument {
        arg: arg.to_string(),
        reason: reason.into(),
    }
}

fn parse<T>(arg: &str) -> Result<T, CommandError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    arg.parse().map_err(|e: T::Err| invalid(arg, e.to_string()))
}

/// First argument parsed, or `default` when none was given
fn parse_or<T>(args: &[&str], default: T) -> Result<T, CommandError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    args.first().map_or(Ok(default), |arg| parse(arg))
}

fn finite(args: &[&str], value: f32) -> Result<(), CommandError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(args.first().copied().unwrap_or(""), "must be finite"))
    }
}

fn parse_bytes(args: &[&str]) -> Result<Vec<u8>, CommandError> {
    args.iter().map(|arg| parse::<u8>(arg)).collect()
}
