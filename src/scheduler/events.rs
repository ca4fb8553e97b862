/*
 * Scheduler Event Definitions
 *
 * The SchedulerCore records every lifecycle operation it forwards to a policy
 * as a SchedEvent. Events are logged at trace level and kept in a small
 * history ring so a misbehaving policy can be inspected after the fact.
 */

use super::{
    task::TaskId,
    types::{CpuId, Priority},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedEvent {
    /// A new task was attached and queued
    TaskSpawned {
        cpu: CpuId,
        tid: TaskId,
        priority: Priority,
    },

    /// A task was forked from a running parent
    TaskForked {
        cpu: CpuId,
        parent: TaskId,
        child: TaskId,
    },

    /// A sleeping task became runnable
    TaskWoke { cpu: CpuId, tid: TaskId },

    /// A task went to sleep
    TaskSlept { cpu: CpuId, tid: TaskId },

    /// The running task gave up its slice
    TaskYielded { cpu: CpuId, tid: TaskId },

    /// A task exited and its slot was released
    TaskExited { cpu: CpuId, tid: TaskId },

    /// Task priority was changed externally
    PriorityChanged {
        tid: TaskId,
        old_priority: Priority,
        new_priority: Priority,
    },

    /// The CPU switched from `prev` to `next` (None = idle)
    Switched {
        cpu: CpuId,
        prev: Option<TaskId>,
        next: Option<TaskId>,
    },

    /// A task moved into or out of this scheduling class
    ClassChanged {
        cpu: CpuId,
        tid: TaskId,
        entering: bool,
    },

    /// Tunables were replaced at runtime
    TunablesChanged,
}

impl SchedEvent {
    /// Get a short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SchedEvent::TaskSpawned { .. } => "TaskSpawned",
            SchedEvent::TaskForked { .. } => "TaskForked",
            SchedEvent::TaskWoke { .. } => "TaskWoke",
            SchedEvent::TaskSlept { .. } => "TaskSlept",
            SchedEvent::TaskYielded { .. } => "TaskYielded",
            SchedEvent::TaskExited { .. } => "TaskExited",
            SchedEvent::PriorityChanged { .. } => "PriorityChanged",
            SchedEvent::Switched { .. } => "Switched",
            SchedEvent::ClassChanged { .. } => "ClassChanged",
            SchedEvent::TunablesChanged => "TunablesChanged",
        }
    }

    /// Task the event is about, if any
    pub fn task(&self) -> Option<TaskId> {
        match *self {
            SchedEvent::TaskSpawned { tid, .. }
            | SchedEvent::TaskWoke { tid, .. }
            | SchedEvent::TaskSlept { tid, .. }
            | SchedEvent::TaskYielded { tid, .. }
            | SchedEvent::TaskExited { tid, .. }
            | SchedEvent::PriorityChanged { tid, .. }
            | SchedEvent::ClassChanged { tid, .. } => Some(tid),
            SchedEvent::TaskForked { child, .. } => Some(child),
            SchedEvent::Switched { next, .. } => next,
            SchedEvent::TunablesChanged => None,
        }
    }
}
