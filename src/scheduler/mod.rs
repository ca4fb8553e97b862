/*
 * KTZ Scheduler
 *
 * Policy and mechanism for timesharing CPU scheduling.
 *
 * LAYOUT:
 * =======
 *
 * - types, error, config: vocabulary shared by everything below
 * - task: arena of per-task scheduling state behind generation-checked ids
 * - runqueue: 64-bucket bitmap priority queue plus per-CPU load counters
 * - accounting: run/sleep history, decay, interactivity score, %CPU
 * - slice: load-sensitive time slice
 * - traits: Scheduler (policy) and KernelSchedCtx (mechanism) seams
 * - policies::ktz: the KTZ lifecycle state machine
 * - sched_core: reference host driving one policy per CPU
 *
 * GLOBAL INSTANCE:
 * ================
 *
 * A kernel holds exactly one SchedulerCore behind a spin::Mutex, taken with
 * interrupts disabled. `init` installs it and `with_core` runs a closure
 * under the lock.
 */

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

pub mod accounting;
pub mod config;
pub mod error;
pub mod events;
pub mod policies;
pub mod runqueue;
pub mod sched_core;
pub mod slice;
pub mod task;
pub mod traits;
pub mod types;

pub use accounting::{Accounting, Interactivity, TaskStats};
pub use config::Tunables;
pub use error::{SchedError, SchedResult};
pub use events::SchedEvent;
pub use policies::KtzPolicy;
pub use runqueue::{CpuRunQueue, RunQueue};
pub use sched_core::{PerCpuSchedState, SchedulerCore};
pub use slice::SliceCalculator;
pub use task::{SchedEntity, TaskId, TaskTable, MAX_TASKS};
pub use traits::{KernelSchedCtx, Scheduler};
pub use types::{
    CpuId, DequeueFlags, DispatchDecision, EnqueueFlags, Priority, QueueStats, TaskState,
    TimeSliceTicks,
};

/// Global scheduler instance
static SCHEDULER_CORE: Mutex<Option<SchedulerCore>> = Mutex::new(None);

/// Set once `init` has installed the core
static SCHEDULER_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize the global scheduler for `cpu_count` CPUs
///
/// Calling it again replaces the previous instance; all task ids handed out
/// by the old one become meaningless.
pub fn init(cpu_count: usize, tunables: Tunables) -> SchedResult<()> {
    log::info!("Initializing KTZ scheduler...");

    let core = SchedulerCore::new(cpu_count, tunables)?;
    *SCHEDULER_CORE.lock() = Some(core);
    SCHEDULER_ENABLED.store(true, Ordering::Release);

    log::info!("Scheduler initialized");
    Ok(())
}

/// Run `f` with the global scheduler locked
///
/// Returns None if `init` has not run yet.
pub fn with_core<R>(f: impl FnOnce(&mut SchedulerCore) -> R) -> Option<R> {
    let mut guard = SCHEDULER_CORE.lock();
    guard.as_mut().map(f)
}

pub fn is_scheduler_enabled() -> bool {
    SCHEDULER_ENABLED.load(Ordering::Acquire)
}
