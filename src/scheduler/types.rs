/*
 * Scheduler Type Definitions
 *
 * This module defines the core types used throughout the scheduler subsystem.
 * These types are designed to be lightweight, Copy-able, and suitable for
 * use in both policy and mechanism layers.
 */

use bitflags::bitflags;
use core::fmt;

use super::task::TaskId;

/// Number of priority buckets in a run queue
pub const RUNQ_BUCKETS: usize = 64;

/// Priorities folded into a single bucket
pub const PRIO_PER_BUCKET: u8 = 4;

/// CPU identifier
///
/// Represents a logical CPU core. Each CPU owns exactly one KTZ run queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl CpuId {
    /// Bootstrap processor (CPU 0)
    pub const BSP: CpuId = CpuId(0);

    /// Get the CPU ID as a usize for indexing
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU({})", self.0)
    }
}

/// Task priority
///
/// Lower values are better: priority 0 lands in bucket 0, which is always
/// scanned first. The full 0..=255 range maps onto the 64 run queue buckets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    /// Best possible priority
    pub const HIGHEST: Priority = Priority(0);

    /// Default for newly spawned timesharing tasks
    pub const NORMAL: Priority = Priority(120);

    /// Worst possible priority
    pub const LOWEST: Priority = Priority(u8::MAX);

    /// Run queue bucket this priority maps to
    pub fn bucket(self) -> usize {
        (self.0 / PRIO_PER_BUCKET) as usize
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

/// Time slice duration in timer ticks
///
/// The policy specifies how long a task should run before being preempted.
/// With a 100Hz timer (10ms per tick), TimeSliceTicks(1) = 10ms.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSliceTicks(pub u32);

impl TimeSliceTicks {
    /// Slice reported when nothing is runnable
    pub const NONE: TimeSliceTicks = TimeSliceTicks(0);

    /// Get the value as u32
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Lifecycle state of a task as seen by the policy
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Known to the policy but not runnable on any queue
    Unqueued,
    /// Linked into a run queue bucket
    Queued,
    /// Picked and executing on its CPU
    Running,
    /// Blocked; sleep time is being measured
    Sleeping,
    /// Exited; accounting has been discarded
    Dead,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Unqueued => "unqueued",
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Sleeping => "sleeping",
            TaskState::Dead => "dead",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Flags passed by the host when a task becomes runnable
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct EnqueueFlags: u8 {
        /// The task is returning from sleep; account the time it slept
        const WAKING = 1;
        /// The task was preempted rather than newly runnable; queue it ahead
        /// of its bucket
        const PREEMPTED = 1 << 1;
    }
}

bitflags! {
    /// Flags passed by the host when a task leaves the run queue
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct DequeueFlags: u8 {
        /// The task is going to sleep; start measuring sleep time
        const SLEEPING = 1;
    }
}

/// Dispatch decision made by a scheduling policy
///
/// After evaluating the current queue, a policy returns this decision
/// indicating what task should run next and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDecision {
    /// Task to schedule next (None = fall back to idle)
    pub next: Option<TaskId>,

    /// Time slice armed for the selected task
    pub timeslice: TimeSliceTicks,
}

impl DispatchDecision {
    /// Create a decision to run a specific task
    pub fn run_task(tid: TaskId, timeslice: TimeSliceTicks) -> Self {
        Self {
            next: Some(tid),
            timeslice,
        }
    }

    /// Create a decision to idle the CPU
    pub fn idle() -> Self {
        Self {
            next: None,
            timeslice: TimeSliceTicks::NONE,
        }
    }
}

/// Load and churn counters of one CPU's queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks queued or running on this CPU
    pub runnable_count: usize,
    /// Load used for slice computation
    pub system_load: usize,
    /// Context switches since the last tick
    pub switch_count: u64,
    /// Value of `switch_count` at the previous tick
    pub prev_switch_count: u64,
    /// Presence bitmap of the run queue
    pub bitmap: u64,
    /// Tasks linked into buckets (excludes the running task)
    pub queued: usize,
}
