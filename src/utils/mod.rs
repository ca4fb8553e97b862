/*
 * Utility Modules
 *
 * Support code shared by the scheduler: currently the debug logging
 * infrastructure.
 */

pub mod debug;
