//! Spectra - stream audio-reactive frames to an LED controller
//!
//! Runs one mode for a fixed time (`--mode`) or an interactive prompt that
//! sets gains, binds the port and starts or clears sessions.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use spectra::audio::{CaptureBackend, CpalCapture, WavCapture};
use spectra::cli::Args;
use spectra::controller::Controller;
use spectra::device::DisplayMode;
use spectra::params::{SharedTunables, CONFIG_TEMPLATE};
use spectra::Analyzer;

/// How often the one-shot runner checks on the session
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .init();

    if args.print_config {
        print!("{}", CONFIG_TEMPLATE);
        return Ok(());
    }
    if args.list_devices {
        for name in CpalCapture::list_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let (mut config, tunables) = args.load_settings()?;

    let capture: Box<dyn CaptureBackend> = match &args.wav {
        Some(path) => {
            let wav = WavCapture::open(path)?;
            if wav.sample_rate() != config.sample_rate_hz || wav.channels() != config.channels {
                log::info!(
                    "analyzing at the file's {}Hz, {} channel(s)",
                    wav.sample_rate(),
                    wav.channels()
                );
                config.sample_rate_hz = wav.sample_rate();
                config.channels = wav.channels();
                config.validate()?;
            }
            Box::new(wav)
        }
        None => Box::new(CpalCapture::new(args.device.clone())),
    };

    let analyzer =
        Analyzer::new(config, SharedTunables::new(tunables)).with_capture(capture);
    let mut controller = Controller::new(analyzer).with_default_port(args.port.clone());

    if args.port.is_some() {
        controller.execute("c").context("failed to open --port")?;
    }

    match args.mode {
        Some(mode) => {
            let display = DisplayMode::from_args(&args.display)?;
            controller.start_mode(mode, display)?;
            let outcome = run_for(&mut controller, args.seconds.map(Duration::from_secs_f32));
            controller.execute("cl").context("failed to clear the display")?;
            outcome.context("session failed")?;
        }
        None => {
            let stdin = io::stdin();
            controller.run(stdin.lock(), io::stdout())?;
        }
    }

    Ok(())
}

/// Wait until `limit` passes or the session ends on its own
fn run_for(controller: &mut Controller, limit: Option<Duration>) -> spectra::Result<()> {
    let started = Instant::now();
    while controller.analyzer().is_running() {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    controller.analyzer_mut().poll()
}
