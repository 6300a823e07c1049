//! Frame serialization, transport writes and frame-rate pacing.

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Frame validity marker at both ends of every frame
pub const FRAME_SENTINEL: u8 = 1;

/// Byte-stream endpoint the frames are written to (serial port, FIFO, ...).
///
/// Writes block; there is no timeout, so a stalled endpoint stalls the
/// frame loop.
pub trait Transport: Send {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

impl<W: Write + Send> Transport for W {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }
}

/// Serializes bucket vectors into `[0x01] b0 .. b(n-1) [0x01]` frames
#[derive(Debug, Clone)]
pub struct FrameStreamer {
    frame: Vec<u8>,
}

impl FrameStreamer {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            frame: vec![0; bucket_count + 2],
        }
    }

    /// Encode `buckets` into the frame buffer, clipping each to a byte
    pub fn encode(&mut self, buckets: &[f32]) -> &[u8] {
        let last = self.frame.len() - 1;
        self.frame[0] = FRAME_SENTINEL;
        self.frame[last] = FRAME_SENTINEL;
        for (byte, &value) in self.frame[1..last].iter_mut().zip(buckets) {
            *byte = clip_to_byte(value);
        }
        &self.frame
    }

    /// Encode and write one frame as a single write
    pub fn stream(&mut self, buckets: &[f32], transport: &mut dyn Transport) -> Result<()> {
        self.encode(buckets);
        transport
            .write_all_bytes(&self.frame)
            .map_err(Error::Transport)
    }
}

/// `min(x, 255)` as a byte; negatives and NaN become 0
pub fn clip_to_byte(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

/// Holds the loop to a fixed frame period.
///
/// A slow frame simply delays the next one; nothing is skipped or caught up.
#[derive(Debug, Clone)]
pub struct FramePacer {
    period: Duration,
    frame_start: Instant,
}

impl FramePacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            frame_start: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Mark the start of a frame
    pub fn begin(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Time left in the current frame, zero once over budget
    pub fn remaining(&self) -> Duration {
        self.period.saturating_sub(self.frame_start.elapsed())
    }

    /// Sleep out the remainder of the frame period
    pub fn pace(&mut self) {
        let remaining = self.remaining();
        if remaining.is_zero() {
            log::trace!(
                "frame overran its {:?} budget by {:?}",
                self.period,
                self.frame_start.elapsed() - self.period
            );
            return;
        }
        thread::sleep(remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_frame_layout() {
        let mut streamer = FrameStreamer::new(4);
        let frame = streamer.encode(&[0.0, 12.7, 255.0, 1000.0]);
        assert_eq!(frame, &[1, 0, 12, 255, 255, 1]);
    }

    #[test]
    fn test_clip_to_byte() {
        assert_eq!(clip_to_byte(-5.0), 0);
        assert_eq!(clip_to_byte(0.03), 0);
        assert_eq!(clip_to_byte(f32::NAN), 0);
        assert_eq!(clip_to_byte(254.9), 254);
        assert_eq!(clip_to_byte(f32::INFINITY), 255);
    }

    #[test]
    fn test_stream_writes_whole_frame() {
        let mut streamer = FrameStreamer::new(3);
        let mut sink: Vec<u8> = Vec::new();

        streamer.stream(&[1.0, 2.0, 3.0], &mut sink).unwrap();
        streamer.stream(&[4.0, 5.0, 6.0], &mut sink).unwrap();
        assert_eq!(sink, vec![1, 1, 2, 3, 1, 1, 4, 5, 6, 1]);
    }

    #[test]
    fn test_stream_reports_transport_error() {
        let mut streamer = FrameStreamer::new(2);
        let err = streamer.stream(&[0.0, 0.0], &mut BrokenPipe).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_pacer_holds_period() {
        let mut pacer = FramePacer::new(Duration::from_millis(20));
        let start = Instant::now();
        pacer.begin();
        pacer.pace();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pacer_does_not_sleep_when_over_budget() {
        let mut pacer = FramePacer::new(Duration::from_millis(1));
        pacer.begin();
        thread::sleep(Duration::from_millis(5));
        assert!(pacer.remaining().is_zero());

        let start = Instant::now();
        pacer.pace();
        assert!(start.elapsed() < Duration::from_millis(5));
    }
}
