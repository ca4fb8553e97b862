/*
 * CLUU KTZ Scheduler
 *
 * The KTZ timesharing scheduling policy for the CLUU microkernel, packaged
 * as a library the kernel's scheduler core links against.
 *
 * Why this is important:
 * - Keeps the policy (which task runs, for how long) out of the mechanism
 *   (context switching, interrupt handling)
 * - Lets the policy be exercised on a hosted target, where the tests run
 * - Provides O(1) priority queues and interactivity accounting suitable for
 *   running with interrupts disabled
 *
 * Key features:
 * - 64-level bitmap run queue with FIFO buckets
 * - Decaying run/sleep history and interactivity score
 * - Load-sensitive time slices
 * - Task lifecycle state machine behind the pluggable Scheduler trait
 */

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod scheduler;
pub mod utils;

#[cfg(test)]
mod tests;

pub use scheduler::{
    CpuId, DequeueFlags, DispatchDecision, EnqueueFlags, KernelSchedCtx, KtzPolicy, Priority,
    SchedError, SchedResult, Scheduler, SchedulerCore, TaskId, TaskState, Tunables,
};
