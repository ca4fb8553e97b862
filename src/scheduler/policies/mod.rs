/*
 * Scheduling Policies
 *
 * Each policy implements the Scheduler trait and is instantiated once per CPU
 * by the SchedulerCore.
 */

pub mod ktz;

pub use ktz::KtzPolicy;
