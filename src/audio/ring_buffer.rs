//! Byte ring buffer shared between the capture callback and the frame loop.
//!
//! One producer (the capture callback) writes interleaved PCM bytes; one
//! consumer (the analyzer thread) repositions the read cursor to the most
//! recent window before every frame and reads it out. Consecutive windows
//! overlap, so the hot path never relies on FIFO consumption.
//!
//! Every operation holds a single `parking_lot::Mutex` for the duration of
//! one copy only.

use parking_lot::Mutex;
use thiserror::Error;

/// Error type for ring buffer operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingBufferError {
    /// Write did not fit and overflow discarding is disabled.
    /// `written` bytes were still stored.
    #[error("ring buffer full: {written} of {requested} bytes stored")]
    Overflow { requested: usize, written: usize },
}

#[derive(Debug)]
struct RingState {
    data: Vec<u8>,
    write_pos: usize,
    read_pos: usize,
    /// Unread bytes between `read_pos` and `write_pos`
    occupancy: usize,
}

/// Fixed-capacity byte ring
#[derive(Debug)]
pub struct RingBuffer {
    state: Mutex<RingState>,
    capacity: usize,
    discard_on_overflow: bool,
}

impl RingBuffer {
    /// Create a zero-filled ring of `capacity` bytes
    pub fn new(capacity: usize, discard_on_overflow: bool) -> Self {
        Self {
            state: Mutex::new(RingState {
                data: vec![0; capacity],
                write_pos: 0,
                read_pos: 0,
                occupancy: 0,
            }),
            capacity,
            discard_on_overflow,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes written but not yet read
    pub fn occupancy(&self) -> usize {
        self.state.lock().occupancy
    }

    pub fn write_cursor(&self) -> usize {
        self.state.lock().write_pos
    }

    pub fn read_cursor(&self) -> usize {
        self.state.lock().read_pos
    }

    /// Append bytes (producer).
    ///
    /// Anything beyond the free space is dropped from the tail of `bytes`.
    /// Returns the number of bytes stored, or `Overflow` if bytes were
    /// dropped while overflow discarding is disabled.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, RingBufferError> {
        let written = {
            let mut state = self.state.lock();
            let free = self.capacity - state.occupancy;
            let count = bytes.len().min(free);

            if count > 0 {
                let start = state.write_pos;
                let first = count.min(self.capacity - start);
                state.data[start..start + first].copy_from_slice(&bytes[..first]);
                state.data[..count - first].copy_from_slice(&bytes[first..count]);

                state.write_pos = (start + count) % self.capacity;
                state.occupancy += count;
            }
            count
        };

        if written < bytes.len() && !self.discard_on_overflow {
            return Err(RingBufferError::Overflow {
                requested: bytes.len(),
                written,
            });
        }
        Ok(written)
    }

    /// Fill `dest` from the read cursor (consumer).
    ///
    /// Copies up to `occupancy` bytes and zero-fills the rest, so the
    /// destination is always written in full. Returns `dest.len()`.
    pub fn read(&self, dest: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        let count = dest.len().min(state.occupancy);

        if count > 0 {
            let start = state.read_pos;
            let first = count.min(self.capacity - start);
            dest[..first].copy_from_slice(&state.data[start..start + first]);
            dest[first..count].copy_from_slice(&state.data[..count - first]);

            state.read_pos = (start + count) % self.capacity;
            state.occupancy -= count;
        }
        drop(state);

        dest[count..].fill(0);
        dest.len()
    }

    /// Move the read cursor to `position` (mod capacity).
    ///
    /// Occupancy becomes the forward distance from the new cursor to the
    /// write cursor; placing it on the write cursor leaves nothing unread.
    pub fn set_read_cursor(&self, position: usize) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        let position = position % self.capacity;
        state.read_pos = position;
        state.occupancy = (state.write_pos + self.capacity - position) % self.capacity;
    }

    /// Move the read cursor back `bytes` from the write cursor, in one lock
    pub fn rewind_from_write(&self, bytes: usize) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        let back = bytes % self.capacity;
        state.read_pos = (state.write_pos + self.capacity - back) % self.capacity;
        state.occupancy = back;
    }

    /// Discard up to `count` unread bytes
    pub fn advance(&self, count: usize) {
        let mut state = self.state.lock();
        let count = count.min(state.occupancy);
        if self.capacity > 0 {
            state.read_pos = (state.read_pos + count) % self.capacity;
        }
        state.occupancy -= count;
    }

    /// Reset both cursors and forget all stored bytes
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.read_pos = 0;
        state.write_pos = 0;
        state.occupancy = 0;
        state.data.fill(0);
    }
}
