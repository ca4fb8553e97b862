/*
 * Ring Buffer for Logging
 *
 * Fixed-size byte ring used to hold formatted log output until the host
 * drains it.
 *
 * Design:
 * - Fixed-size circular buffer (8KB), no heap allocations
 * - Overwrite on overflow (loses the oldest bytes)
 * - Implements fmt::Write so records can be formatted straight into it
 *
 * The buffer itself is not synchronised; log_buffer wraps it in a
 * spin::Mutex.
 */

use core::fmt;

/// Size of the ring buffer
pub const BUFFER_SIZE: usize = 8 * 1024;

/// Ring buffer for log messages
pub struct RingBuffer {
    buffer: [u8; BUFFER_SIZE],

    /// Write position
    head: usize,

    /// Bytes currently stored
    len: usize,
}

impl RingBuffer {
    /// Create a new empty ring buffer
    pub const fn new() -> Self {
        Self {
            buffer: [0; BUFFER_SIZE],
            head: 0,
            len: 0,
        }
    }

    /// Write a string to the ring buffer
    ///
    /// If the buffer is full, old data is overwritten. A message longer than
    /// the whole buffer keeps only its last BUFFER_SIZE bytes.
    ///
    /// # Returns
    /// Number of bytes actually stored
    pub fn write(&mut self, data: &str) -> usize {
        let mut bytes = data.as_bytes();
        if bytes.len() > BUFFER_SIZE {
            bytes = &bytes[bytes.len() - BUFFER_SIZE..];
        }

        for &byte in bytes {
            self.buffer[self.head] = byte;
            self.head = (self.head + 1) % BUFFER_SIZE;
        }
        self.len = (self.len + bytes.len()).min(BUFFER_SIZE);

        bytes.len()
    }

    /// Move the oldest buffered bytes into `dest`
    ///
    /// # Returns
    /// Number of bytes actually read
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let tail = (self.head + BUFFER_SIZE - self.len) % BUFFER_SIZE;
        let to_read = self.len.min(dest.len());

        for (i, slot) in dest.iter_mut().take(to_read).enumerate() {
            *slot = self.buffer[(tail + i) % BUFFER_SIZE];
        }
        self.len -= to_read;

        to_read
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the number of bytes currently in the buffer
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for RingBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}
