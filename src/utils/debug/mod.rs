/*
 * Debugging and Logging Utilities
 *
 * This module contains the logging infrastructure: a `log` backend that
 * formats records into an in-memory ring buffer, which the host drains to
 * whatever console it has.
 */

pub mod log_buffer;
pub mod logger;
pub mod ring_buffer;

pub use log_buffer::drain;
pub use logger::{init, KtzLogger};
