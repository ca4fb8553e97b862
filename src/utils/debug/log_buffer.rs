/*
 * Buffered Logging System
 *
 * Log records are formatted into a global ring buffer instead of being
 * written to a device. The host drains the buffer to its console when it
 * is safe to do so (idle loop, after the scheduler lock is released).
 *
 * Benefits:
 * - Logging from inside the scheduler never touches hardware
 * - Fast logging (just a copy into the buffer)
 * - No heap allocations
 */

use core::fmt::{self, Write};

use log::Level;
use spin::Mutex;

use super::ring_buffer::RingBuffer;

/// Global log buffer
static LOG_BUFFER: Mutex<RingBuffer> = Mutex::new(RingBuffer::new());

/// Format one record into the buffer
pub fn write_record(level: Level, target: &str, args: &fmt::Arguments<'_>) {
    let mut buffer = LOG_BUFFER.lock();
    let _ = writeln!(buffer, "[{}] {}: {}", level, target, args);
}

/// Move buffered log output into `dest`
///
/// # Returns
/// Number of bytes copied; 0 once the buffer is empty
pub fn drain(dest: &mut [u8]) -> usize {
    LOG_BUFFER.lock().read(dest)
}

/// Get current buffer usage (for monitoring)
pub fn buffer_usage() -> usize {
    LOG_BUFFER.lock().len()
}
