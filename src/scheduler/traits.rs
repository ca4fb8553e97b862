/*
 * Scheduler Trait Definitions
 *
 * This module defines the traits that separate scheduling policy from mechanism:
 *
 * - Scheduler: The policy interface, one instance per CPU
 * - KernelSchedCtx: The mechanism interface that policies use to interact with the kernel
 *
 * This separation allows:
 * 1. Swapping scheduling algorithms without changing kernel code
 * 2. Testing policies in isolation
 * 3. Clear ownership boundaries (policies only see scheduling fields)
 */

use super::{
    config::Tunables,
    error::SchedResult,
    task::{TaskId, TaskTable},
    types::{CpuId, DequeueFlags, DispatchDecision, EnqueueFlags, Priority, QueueStats, TimeSliceTicks},
};

/// Scheduling policy trait
///
/// The SchedulerCore (mechanism) holds one Box<dyn Scheduler> per CPU and
/// calls into it at every task lifecycle event. Calls for one CPU are never
/// concurrent; the mechanism provides that exclusion.
///
/// Every method either completes or returns an error without having touched
/// the queue. None of them block or allocate.
pub trait Scheduler: Send {
    /// A task became runnable on this CPU
    fn enqueue(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        tid: TaskId,
        flags: EnqueueFlags,
    ) -> SchedResult<()>;

    /// A task stopped being runnable (sleep, exit, class change)
    fn dequeue(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        tid: TaskId,
        flags: DequeueFlags,
    ) -> SchedResult<()>;

    /// Choose the next task to run
    ///
    /// `prev` is the task that was running, if any; it is put back on the
    /// queue first when it is still runnable.
    fn pick_next(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        prev: Option<TaskId>,
    ) -> SchedResult<DispatchDecision>;

    /// Timer tick while `current` runs
    fn tick(&mut self, ctx: &mut dyn KernelSchedCtx, current: TaskId) -> SchedResult<()>;

    /// External priority change
    fn set_priority(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        tid: TaskId,
        priority: Priority,
    ) -> SchedResult<()>;

    /// This policy became responsible for `tid`
    fn switched_to(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        tid: TaskId,
        running: bool,
    ) -> SchedResult<()>;

    /// This policy stopped being responsible for `tid`
    fn switched_from(&mut self, ctx: &mut dyn KernelSchedCtx, tid: TaskId) -> SchedResult<()>;

    /// `child` was forked from `parent`; both are already attached
    fn task_fork(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        parent: TaskId,
        child: TaskId,
    ) -> SchedResult<()>;

    /// `tid` exited
    fn task_dead(&mut self, ctx: &mut dyn KernelSchedCtx, tid: TaskId) -> SchedResult<()>;

    /// The running task gave up the rest of its slice
    fn yield_task(&mut self, ctx: &mut dyn KernelSchedCtx, tid: TaskId) -> SchedResult<()>;

    /// A task was just enqueued; preempt the running task if it should
    fn check_preempt(&mut self, ctx: &mut dyn KernelSchedCtx, woken: TaskId) -> SchedResult<()>;

    /// Slice `tid` would get if it were armed now
    fn rr_interval(&self, ctx: &mut dyn KernelSchedCtx, tid: TaskId) -> SchedResult<TimeSliceTicks>;

    /// Replace the tunables
    fn set_tunables(&mut self, tunables: Tunables) -> SchedResult<()>;

    fn stats(&self) -> QueueStats;

    /// Get the policy name for debugging
    fn name(&self) -> &'static str;
}

/// Kernel context interface for scheduling policies
///
/// This trait is the ONLY way policies can query or modify kernel state.
/// The mechanism (SchedulerCore) provides an implementation of it for the
/// duration of each policy call.
pub trait KernelSchedCtx {
    /// Current tick count
    fn now_ticks(&self) -> u64;

    /// Scheduling state of every task
    fn tasks(&mut self) -> &mut TaskTable;

    /// Request that a CPU should reschedule at the next opportunity
    fn request_reschedule(&mut self, cpu: CpuId);

    /// Get number of CPUs in the system
    fn cpu_count(&self) -> usize;
}
