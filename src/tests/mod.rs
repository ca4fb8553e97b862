/*
 * Test Suite for the KTZ Scheduler
 *
 * Unit tests live next to the code they cover. This module holds the suites
 * that drive several components together:
 *
 * - `scenarios`: end-to-end behaviour through SchedulerCore
 * - `properties`: proptest invariants (bitmap/load, decay, slice, score)
 * - `global`: the spin::Mutex guarded global instance
 *
 * `TestCtx` is a minimal KernelSchedCtx for driving a policy directly.
 */


use std::vec::Vec;

use crate::scheduler::{
    task::{TaskId, TaskTable},
    traits::KernelSchedCtx,
    types::{CpuId, Priority},
};

/// Hand-driven kernel context: the test owns the clock
pub(crate) struct TestCtx {
    pub tasks: TaskTable,
    pub now: u64,
    /// Every reschedule request, in order
    pub resched: Vec<CpuId>,
    pub cpus: usize,
}

impl TestCtx {
    pub fn new() -> Self {
        Self {
            tasks: TaskTable::new(),
            now: 0,
            resched: Vec::new(),
            cpus: 2,
        }
    }

    /// Attach a task at the current time
    pub fn spawn(&mut self, priority: Priority) -> TaskId {
        self.tasks.attach(priority, self.now).unwrap()
    }
}

impl KernelSchedCtx for TestCtx {
    fn now_ticks(&self) -> u64 {
        self.now
    }

    fn tasks(&mut self) -> &mut TaskTable {
        &mut self.tasks
    }

    fn request_reschedule(&mut self, cpu: CpuId) {
        self.resched.push(cpu);
    }

    fn cpu_count(&self) -> usize {
        self.cpus
    }
}
