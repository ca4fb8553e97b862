/*
 * Scheduler Logging Backend
 *
 * This module implements the `log` backend for the KTZ scheduler. Records
 * go to the buffered logging system rather than a serial port, since the
 * scheduler runs with its lock held and often with interrupts disabled.
 *
 * The level filter is the global one set through `log::set_max_level`;
 * per-tick detail is at trace level and costs nothing when filtered out.
 */

use log::{LevelFilter, Metadata, Record, SetLoggerError};

use super::log_buffer;

/// Logger writing into the scheduler's log ring buffer
pub struct KtzLogger;

impl log::Log for KtzLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            log_buffer::write_record(record.level(), record.target(), record.args());
        }
    }

    /// Nothing to flush; the host drains the buffer.
    fn flush(&self) {}
}

static LOGGER: KtzLogger = KtzLogger;

/// Install the logger with the given level filter
///
/// Fails if another logger was installed first.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}
