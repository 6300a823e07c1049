//! Analyzer session lifecycle and the per-frame loop.
//!
//! States: Idle → Recording → Stopping → Idle. A session owns one ring
//! buffer, one capture stream and one background thread running
//! source → shape → stream → pace until its running flag is cleared or a
//! fatal error ends it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::audio::{CaptureBackend, CaptureSink, IndexMap, RingBuffer};
use crate::device::DeviceCommand;
use crate::error::{Error, Result};
use crate::params::{AnalyzerConfig, SharedTunables};
use crate::shaping::ShapingPipeline;
use crate::sources::{BucketSource, Mode};
use crate::stream::{FramePacer, FrameStreamer, Transport};

/// Transport shared between the control plane (commands) and the frame loop
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Recording,
    Stopping,
}

struct Session {
    mode: Mode,
    running: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<Error>>>,
    handle: Option<thread::JoinHandle<()>>,
    ring: Option<Arc<RingBuffer>>,
}

/// Owns the capture backend, the bound transport and at most one session
pub struct Analyzer {
    config: AnalyzerConfig,
    tunables: SharedTunables,
    capture: Option<Box<dyn CaptureBackend>>,
    transport: Option<SharedTransport>,
    state: State,
    session: Option<Session>,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig, tunables: SharedTunables) -> Self {
        Self {
            config,
            tunables,
            capture: None,
            transport: None,
            state: State::Idle,
            session: None,
        }
    }

    /// Use `capture` for spectrum and waveform sessions
    pub fn with_capture(mut self, capture: Box<dyn CaptureBackend>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn tunables(&self) -> &SharedTunables {
        &self.tunables
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Mode of the current session, if any
    pub fn mode(&self) -> Option<Mode> {
        self.session.as_ref().map(|s| s.mode)
    }

    /// True while a session's frame loop is alive
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.running.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn is_bound(&self) -> bool {
        self.transport.is_some()
    }

    /// Bind the byte-stream endpoint frames and commands are written to
    pub fn bind_transport(&mut self, transport: impl Transport + 'static) {
        if self.transport.is_some() {
            self.unbind_transport();
        }
        let transport: Box<dyn Transport> = Box::new(transport);
        self.transport = Some(Arc::new(Mutex::new(transport)));
    }

    /// Drop the bound transport, stopping any session first.
    /// Returns false when nothing was bound.
    pub fn unbind_transport(&mut self) -> bool {
        if self.session.is_some() {
            if let Err(e) = self.stop() {
                log::warn!("session ended with error before unbinding: {}", e);
            }
        }
        self.transport.take().is_some()
    }

    /// Write a device command between frames
    pub fn send_command(&self, command: &DeviceCommand) -> Result<()> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| Error::config("no transport bound"))?;
        let mut transport = transport.lock();
        command.send(&mut **transport)
    }

    /// Start a session in `mode`.
    ///
    /// Requires a bound transport and a valid configuration. Capture modes
    /// start the capture backend into a fresh ring buffer and wait out the
    /// warm-up before the first frame.
    pub fn start(&mut self, mode: Mode) -> Result<()> {
        if let Err(e) = self.poll() {
            log::warn!("previous session ended with error: {}", e);
        }
        if self.state != State::Idle {
            return Err(Error::config(format!(
                "cannot start {} mode while {:?}",
                mode, self.state
            )));
        }
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| Error::config("no transport bound"))?;
        self.config.validate()?;
        self.tunables.snapshot().validate()?;

        let config = self.config.clone();
        let ring = mode.needs_capture().then(|| {
            Arc::new(RingBuffer::new(
                config.ring_capacity(),
                config.discard_on_overflow,
            ))
        });
        let source = mode.build_source(&config, ring.clone())?;

        let sink = match &ring {
            Some(ring) => Some(self.begin_capture(Arc::clone(ring))?),
            None => None,
        };

        log::debug!(
            "session parameters: {:?}, tunables {:?}",
            config,
            self.tunables.snapshot()
        );

        let running = Arc::new(AtomicBool::new(true));
        let failure = Arc::new(Mutex::new(None));
        let frame_loop = FrameLoop {
            source,
            shaping: None,
            buckets: vec![0.0; config.bucket_count],
            streamer: FrameStreamer::new(config.bucket_count),
            pacer: FramePacer::new(config.frame_period()),
            tunables: self.tunables.clone(),
            transport,
            sink,
            running: Arc::clone(&running),
        }
        .with_shaping(mode, &config);

        let thread_running = Arc::clone(&running);
        let thread_failure = Arc::clone(&failure);
        let spawned = thread::Builder::new()
            .name("spectra-analyzer".into())
            .spawn(move || {
                if let Err(e) = frame_loop.run() {
                    log::error!("analyzer session ended: {}", e);
                    *thread_failure.lock() = Some(e);
                }
                thread_running.store(false, Ordering::Release);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.release_capture();
                return Err(Error::resource(format!("failed to spawn frame loop: {}", e)));
            }
        };

        log::info!(
            "{} session started: {} buckets @ {}Hz",
            mode,
            config.bucket_count,
            config.frame_rate_hz
        );

        self.session = Some(Session {
            mode,
            running,
            failure,
            handle: Some(handle),
            ring,
        });
        self.state = State::Recording;
        Ok(())
    }

    fn begin_capture(&mut self, ring: Arc<RingBuffer>) -> Result<CaptureSink> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| Error::resource("no capture backend configured"))?;

        let sink = CaptureSink::new(ring);
        capture.start(sink.clone())?;

        let rate = capture.sample_rate();
        if rate != 0 && rate != self.config.sample_rate_hz {
            log::warn!(
                "capture delivers {}Hz but analysis assumes {}Hz; frequencies will be skewed",
                rate,
                self.config.sample_rate_hz
            );
        }

        thread::sleep(self.config.warm_up);
        Ok(sink)
    }

    /// Clear the running flag, wait the grace period, then release capture.
    ///
    /// Returns the error that ended the session, if one did. Stopping an
    /// idle analyzer is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let (running, handle) = match self.session.as_mut() {
            Some(session) => (Arc::clone(&session.running), session.handle.take()),
            None => return Ok(()),
        };
        self.state = State::Stopping;
        running.store(false, Ordering::Release);
        thread::sleep(self.config.stop_grace);

        if let Some(handle) = handle {
            if handle.is_finished() {
                if handle.join().is_err() {
                    log::error!("frame loop panicked");
                }
            } else {
                log::warn!(
                    "frame loop still running after {:?}; detaching",
                    self.config.stop_grace
                );
            }
        }

        self.stop_recording();
        self.state = State::Idle;

        if let Some(session) = self.session.take() {
            log::info!("{} session stopped", session.mode);
            if let Some(e) = session.failure.lock().take() {
                return Err(e);
            }
        }
        Ok(())
    }

    /// Reap a session whose frame loop ended on its own.
    ///
    /// Joins the finished thread, releases capture and returns to Idle,
    /// handing back the error that ended the loop. A live session or an
    /// idle analyzer is left untouched.
    pub fn poll(&mut self) -> Result<()> {
        let ended = match &self.session {
            Some(session) => !session.running.load(Ordering::Acquire),
            None => false,
        };
        if !ended || self.state != State::Recording {
            return Ok(());
        }

        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        if let Some(handle) = session.handle.take() {
            if handle.join().is_err() {
                log::error!("frame loop panicked");
            }
        }
        if let Some(ring) = session.ring.take() {
            ring.clear();
        }
        self.release_capture();
        self.state = State::Idle;
        log::info!("{} session ended", session.mode);

        let failure = session.failure.lock().take();
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Release the capture stream and forget buffered audio
    pub fn stop_recording(&mut self) {
        if let Some(ring) = self.session.as_mut().and_then(|s| s.ring.take()) {
            ring.clear();
        }
        self.release_capture();
    }

    fn release_capture(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.stop();
        }
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("session ended with error: {}", e);
        }
    }
}

/// State moved onto the analyzer thread
struct FrameLoop {
    source: Box<dyn BucketSource>,
    shaping: Option<ShapingPipeline>,
    /// Unshaped modes write here
    buckets: Vec<f32>,
    streamer: FrameStreamer,
    pacer: FramePacer,
    tunables: SharedTunables,
    transport: SharedTransport,
    sink: Option<CaptureSink>,
    running: Arc<AtomicBool>,
}

impl FrameLoop {
    fn with_shaping(mut self, mode: Mode, config: &AnalyzerConfig) -> Self {
        if mode.shapes() {
            let index_map = IndexMap::from_config(config);
            self.shaping = Some(ShapingPipeline::new(index_map.counts()));
        }
        self
    }

    fn run(mut self) -> Result<()> {
        while self.running.load(Ordering::Acquire) {
            self.pacer.begin();
            self.frame()?;
            self.pacer.pace();
        }
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let tunables = self.tunables.snapshot();

        if let Some(sink) = &self.sink {
            if sink.is_lost() {
                return Err(Error::resource("capture stream lost"));
            }
        }

        let buckets: &[f32] = match self.shaping.as_mut() {
            Some(shaping) => {
                self.source.fill(&tunables, shaping.input());
                shaping.run(&tunables)
            }
            None => {
                self.source.fill(&tunables, &mut self.buckets);
                &self.buckets
            }
        };

        let mut transport = self.transport.lock();
        self.streamer.stream(buckets, &mut **transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::time::Duration;

    /// Capture stand-in whose sink the test drives directly
    #[derive(Clone, Default)]
    struct ManualCapture {
        sink: Arc<Mutex<Option<CaptureSink>>>,
        fail_start: bool,
    }

    impl CaptureBackend for ManualCapture {
        fn start(&mut self, sink: CaptureSink) -> Result<()> {
            if self.fail_start {
                return Err(Error::resource("device unplugged"));
            }
            *self.sink.lock() = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            self.sink.lock().take();
        }

        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Unplugged;

    impl Write for Unplugged {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn fast_config() -> AnalyzerConfig {
        AnalyzerConfig {
            frame_rate_hz: 200,
            warm_up: Duration::from_millis(10),
            stop_grace: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn analyzer_with(capture: ManualCapture) -> Analyzer {
        Analyzer::new(fast_config(), SharedTunables::default()).with_capture(Box::new(capture))
    }

    #[test]
    fn test_start_requires_transport() {
        let mut analyzer = analyzer_with(ManualCapture::default());
        let err = analyzer.start(Mode::Spectrum).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(analyzer.state(), State::Idle);
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let config = AnalyzerConfig {
            bucket_count: 0,
            ..fast_config()
        };
        let mut analyzer = Analyzer::new(config, SharedTunables::default());
        analyzer.bind_transport(SharedBuffer::default());
        assert!(matches!(
            analyzer.start(Mode::Procedural),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_capture_failure_is_resource_error() {
        let mut analyzer = analyzer_with(ManualCapture {
            fail_start: true,
            ..Default::default()
        });
        analyzer.bind_transport(SharedBuffer::default());
        assert!(matches!(
            analyzer.start(Mode::Waveform),
            Err(Error::Resource(_))
        ));
        assert_eq!(analyzer.state(), State::Idle);

        let mut no_backend = Analyzer::new(fast_config(), SharedTunables::default());
        no_backend.bind_transport(SharedBuffer::default());
        assert!(matches!(
            no_backend.start(Mode::Spectrum),
            Err(Error::Resource(_))
        ));
    }

    #[test]
    fn test_procedural_session_streams_frames() {
        let output = SharedBuffer::default();
        let mut analyzer = Analyzer::new(fast_config(), SharedTunables::default());
        analyzer.bind_transport(output.clone());

        analyzer.start(Mode::Procedural).unwrap();
        assert_eq!(analyzer.state(), State::Recording);
        assert_eq!(analyzer.mode(), Some(Mode::Procedural));
        assert!(matches!(
            analyzer.start(Mode::Procedural),
            Err(Error::Configuration(_))
        ));

        thread::sleep(Duration::from_millis(60));
        analyzer.stop().unwrap();
        assert_eq!(analyzer.state(), State::Idle);

        let bytes = output.0.lock().clone();
        let frame_len = fast_config().frame_len();
        assert!(bytes.len() >= frame_len);
        assert_eq!(bytes.len() % frame_len, 0);
        for frame in bytes.chunks(frame_len) {
            assert_eq!(frame[0], 1);
            assert_eq!(frame[frame_len - 1], 1);
        }
    }

    #[test]
    fn test_silence_session_streams_empty_frames() {
        let capture = ManualCapture::default();
        let output = SharedBuffer::default();
        let mut analyzer = analyzer_with(capture.clone());
        analyzer.bind_transport(output.clone());

        analyzer.start(Mode::Spectrum).unwrap();
        let sink = capture.sink.lock().clone().unwrap();
        sink.on_samples(&vec![0.0; 16_384]);
        thread::sleep(Duration::from_millis(60));
        analyzer.stop().unwrap();
        assert!(capture.sink.lock().is_none(), "capture released on stop");

        let bytes = output.0.lock().clone();
        let frame_len = fast_config().frame_len();
        assert!(!bytes.is_empty());
        for frame in bytes.chunks(frame_len) {
            assert_eq!(frame[0], 1);
            assert!(frame[1..frame_len - 1].iter().all(|&b| b == 0));
            assert_eq!(frame[frame_len - 1], 1);
        }
    }

    #[test]
    fn test_lost_capture_ends_session() {
        let capture = ManualCapture::default();
        let mut analyzer = analyzer_with(capture.clone());
        analyzer.bind_transport(SharedBuffer::default());

        analyzer.start(Mode::Waveform).unwrap();
        capture.sink.lock().as_ref().unwrap().mark_lost();
        thread::sleep(Duration::from_millis(30));
        assert!(!analyzer.is_running());

        let err = analyzer.stop().unwrap_err();
        assert!(matches!(err, Error::Resource(_)));
    }

    #[test]
    fn test_transport_failure_ends_session() {
        let mut analyzer = Analyzer::new(fast_config(), SharedTunables::default());
        analyzer.bind_transport(Unplugged);

        analyzer.start(Mode::Procedural).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(!analyzer.is_running());
        assert!(matches!(analyzer.stop(), Err(Error::Transport(_))));
        assert_eq!(analyzer.state(), State::Idle);
    }

    #[test]
    fn test_failed_session_releases_capture() {
        let capture = ManualCapture::default();
        let mut analyzer = analyzer_with(capture.clone());
        analyzer.bind_transport(Unplugged);

        analyzer.start(Mode::Spectrum).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(!analyzer.is_running());

        assert!(matches!(analyzer.poll(), Err(Error::Transport(_))));
        assert_eq!(analyzer.state(), State::Idle);
        assert!(capture.sink.lock().is_none(), "capture released on failure");
        assert!(analyzer.mode().is_none());
        assert!(analyzer.poll().is_ok());

        analyzer.bind_transport(SharedBuffer::default());
        analyzer.start(Mode::Waveform).unwrap();
        assert!(capture.sink.lock().is_some());
        analyzer.stop().unwrap();
    }

    #[test]
    fn test_start_reaps_ended_session() {
        let mut analyzer = Analyzer::new(fast_config(), SharedTunables::default());
        analyzer.bind_transport(Unplugged);

        analyzer.start(Mode::Procedural).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(analyzer.state(), State::Recording);

        assert!(analyzer.start(Mode::Procedural).is_ok());
        analyzer.stop().ok();
        assert_eq!(analyzer.state(), State::Idle);
    }

    #[test]
    fn test_poll_leaves_live_session() {
        let mut analyzer = Analyzer::new(fast_config(), SharedTunables::default());
        analyzer.bind_transport(SharedBuffer::default());

        analyzer.start(Mode::Procedural).unwrap();
        assert!(analyzer.poll().is_ok());
        assert_eq!(analyzer.state(), State::Recording);
        analyzer.stop().unwrap();
    }

    #[test]
    fn test_send_command_and_idle_stop() {
        let output = SharedBuffer::default();
        let mut analyzer = Analyzer::new(fast_config(), SharedTunables::default());
        assert!(analyzer.send_command(&DeviceCommand::clear()).is_err());
        assert!(analyzer.stop().is_ok());

        analyzer.bind_transport(output.clone());
        analyzer.send_command(&DeviceCommand::clear()).unwrap();
        assert_eq!(*output.0.lock(), vec![192]);

        assert!(analyzer.unbind_transport());
        assert!(!analyzer.unbind_transport());
    }
}
