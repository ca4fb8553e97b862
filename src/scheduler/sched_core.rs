/*
 * Scheduler Core - Mechanism Layer
 *
 * This module implements SchedulerCore, the mechanism layer that:
 * 1. Owns the task arena and one scheduling policy per CPU (Box<dyn Scheduler>)
 * 2. Manages per-CPU scheduling state (current task, need_resched, counters)
 * 3. Keeps the jiffies clock, advanced by the boot CPU's timer tick
 * 4. Translates host operations into policy calls and SchedEvents
 *
 * The SchedulerCore separates "mechanism" (who is current, when to switch)
 * from "policy" (which task runs next and for how long). Policies only see
 * the kernel through a SchedContext built for the duration of each call.
 */

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use heapless::Deque;

use super::{
    accounting::{Accounting, TaskStats},
    config::Tunables,
    error::{SchedError, SchedResult},
    events::SchedEvent,
    policies::KtzPolicy,
    task::{TaskId, TaskTable},
    traits::{KernelSchedCtx, Scheduler},
    types::{CpuId, DequeueFlags, EnqueueFlags, Priority, QueueStats, TaskState, TimeSliceTicks},
};

/// Number of events kept for inspection
pub const EVENT_HISTORY: usize = 32;

/// Per-CPU scheduling state
#[derive(Debug)]
pub struct PerCpuSchedState {
    /// Which CPU this state belongs to
    pub cpu_id: CpuId,

    /// Task currently running on this CPU (None = idle)
    pub current: Option<TaskId>,

    /// Placeholder charged for ticks while the CPU idles
    pub idle: TaskId,

    /// Whether this CPU needs to reschedule at next opportunity
    pub need_resched: bool,

    /// Total ticks this CPU has taken
    pub total_ticks: u64,

    /// Number of context switches performed
    pub context_switches: u64,
}

impl PerCpuSchedState {
    pub fn new(cpu_id: CpuId, idle: TaskId) -> Self {
        Self {
            cpu_id,
            current: None,
            idle,
            need_resched: false,
            total_ticks: 0,
            context_switches: 0,
        }
    }

    /// Request that this CPU should reschedule
    pub fn request_reschedule(&mut self) {
        self.need_resched = true;
    }

    /// Reset reschedule flag
    pub fn clear_reschedule(&mut self) {
        self.need_resched = false;
    }
}

/// View of the kernel handed to a policy for one call
struct SchedContext<'a> {
    clock: u64,
    tasks: &'a mut TaskTable,
    per_cpu: &'a mut [PerCpuSchedState],
}

impl KernelSchedCtx for SchedContext<'_> {
    fn now_ticks(&self) -> u64 {
        self.clock
    }

    fn tasks(&mut self) -> &mut TaskTable {
        self.tasks
    }

    fn request_reschedule(&mut self, cpu: CpuId) {
        match self.per_cpu.get_mut(cpu.as_usize()) {
            Some(state) => state.request_reschedule(),
            None => log::warn!("sched: reschedule requested for unknown {}", cpu),
        }
    }

    fn cpu_count(&self) -> usize {
        self.per_cpu.len()
    }
}

/// Scheduler Core - The Mechanism Layer
///
/// External code calls spawn(), wake(), sleep(), on_tick(), reschedule()
/// and friends; SchedulerCore forwards them to the policy owning the CPU and
/// keeps the per-CPU bookkeeping in step with the policy's decisions.
pub struct SchedulerCore {
    tasks: Box<TaskTable>,
    per_cpu: Vec<PerCpuSchedState>,
    policies: Vec<Box<dyn Scheduler>>,
    tunables: Tunables,
    clock: u64,
    events: Deque<SchedEvent, EVENT_HISTORY>,
}

impl SchedulerCore {
    /// Create a SchedulerCore with one KTZ policy per CPU
    pub fn new(cpu_count: usize, tunables: Tunables) -> SchedResult<Self> {
        if cpu_count == 0 {
            return Err(SchedError::InvalidCpu(CpuId::BSP));
        }
        tunables.validate()?;

        let mut tasks = Box::new(TaskTable::new());
        let mut per_cpu = Vec::with_capacity(cpu_count);
        let mut policies: Vec<Box<dyn Scheduler>> = Vec::with_capacity(cpu_count);
        for i in 0..cpu_count {
            let cpu = CpuId(i as u32);
            let idle = tasks.attach_idle(0)?;
            per_cpu.push(PerCpuSchedState::new(cpu, idle));
            policies.push(Box::new(KtzPolicy::new(cpu, tunables)?));
        }

        log::info!("SchedulerCore initialized with policy: {}", policies[0].name());
        log::info!("Managing {} CPU(s)", cpu_count);

        Ok(Self {
            tasks,
            per_cpu,
            policies,
            tunables,
            clock: 0,
            events: Deque::new(),
        })
    }

    /// Get the name of the active policy
    pub fn policy_name(&self) -> &'static str {
        self.policies[0].name()
    }

    pub fn cpu_count(&self) -> usize {
        self.per_cpu.len()
    }

    /// Current jiffies
    pub fn now(&self) -> u64 {
        self.clock
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    fn cpu_index(&self, cpu: CpuId) -> SchedResult<usize> {
        let idx = cpu.as_usize();
        if idx < self.policies.len() {
            Ok(idx)
        } else {
            Err(SchedError::InvalidCpu(cpu))
        }
    }

    /// Run `f` against the policy of `cpu` with a fresh kernel context
    fn with_policy<R>(
        &mut self,
        cpu: CpuId,
        f: impl FnOnce(&mut dyn Scheduler, &mut dyn KernelSchedCtx) -> SchedResult<R>,
    ) -> SchedResult<R> {
        let idx = self.cpu_index(cpu)?;
        let mut ctx = SchedContext {
            clock: self.clock,
            tasks: self.tasks.as_mut(),
            per_cpu: &mut self.per_cpu,
        };
        let policy = self.policies[idx].as_mut();

        let result = f(&mut *policy, &mut ctx);
        if let Err(err) = &result {
            log::error!("sched: {} policy on {} failed: {}", policy.name(), cpu, err);
        }
        result
    }

    /// CPU whose queue holds `tid`, or the boot CPU for tasks off every queue
    fn owner_of(&self, tid: TaskId) -> SchedResult<CpuId> {
        Ok(self.tasks.get(tid)?.cpu.unwrap_or(CpuId::BSP))
    }

    /// Refuse `op` on a CPU's idle placeholder; only ticks may charge it
    fn reject_idle(&self, tid: TaskId, op: &'static str) -> SchedResult<()> {
        let se = self.tasks.get(tid)?;
        if se.is_idle {
            return Err(SchedError::InvalidState {
                tid,
                state: se.state,
                op,
            });
        }
        Ok(())
    }

    fn record(&mut self, event: SchedEvent) {
        log::trace!("sched event: {} {:?}", event.name(), event);
        if self.events.is_full() {
            self.events.pop_front();
        }
        let _ = self.events.push_back(event);
    }

    /// Forget `tid` as the current task of `cpu` if it was
    fn drop_current(&mut self, cpu: CpuId, tid: TaskId) {
        if let Some(state) = self.per_cpu.get_mut(cpu.as_usize()) {
            if state.current == Some(tid) {
                state.current = None;
                state.request_reschedule();
            }
        }
    }

    // ========================================================================
    // EXTERNAL API - What the rest of the kernel calls
    // ========================================================================

    /// Attach a new task and queue it on `cpu`
    pub fn spawn(&mut self, cpu: CpuId, priority: Priority) -> SchedResult<TaskId> {
        self.cpu_index(cpu)?;
        let tid = self.tasks.attach(priority, self.clock)?;

        let queued = self.with_policy(cpu, |p, ctx| p.enqueue(ctx, tid, EnqueueFlags::empty()));
        if let Err(err) = queued {
            self.tasks.detach(tid)?;
            return Err(err);
        }
        self.with_policy(cpu, |p, ctx| p.check_preempt(ctx, tid))?;

        self.record(SchedEvent::TaskSpawned { cpu, tid, priority });
        Ok(tid)
    }

    /// Fork `parent` into a new task queued on `cpu`
    pub fn fork(&mut self, cpu: CpuId, parent: TaskId) -> SchedResult<TaskId> {
        self.cpu_index(cpu)?;
        self.reject_idle(parent, "fork")?;
        let priority = self.tasks.get(parent)?.priority;
        let child = self.tasks.attach(priority, self.clock)?;

        let queued = self.with_policy(cpu, |p, ctx| {
            p.task_fork(ctx, parent, child)?;
            p.enqueue(ctx, child, EnqueueFlags::empty())
        });
        if let Err(err) = queued {
            self.tasks.detach(child)?;
            return Err(err);
        }
        self.with_policy(cpu, |p, ctx| p.check_preempt(ctx, child))?;

        self.record(SchedEvent::TaskForked { cpu, parent, child });
        Ok(child)
    }

    /// A sleeping task became runnable on `cpu`
    pub fn wake(&mut self, cpu: CpuId, tid: TaskId) -> SchedResult<()> {
        self.reject_idle(tid, "wake")?;
        self.with_policy(cpu, |p, ctx| {
            p.enqueue(ctx, tid, EnqueueFlags::WAKING)?;
            p.check_preempt(ctx, tid)
        })?;
        self.record(SchedEvent::TaskWoke { cpu, tid });
        Ok(())
    }

    /// `tid` blocks; it keeps its slot but leaves the queue
    pub fn sleep(&mut self, tid: TaskId) -> SchedResult<()> {
        self.reject_idle(tid, "sleep")?;
        let cpu = self.tasks.get(tid)?.cpu.ok_or(SchedError::NotQueued(tid))?;
        self.with_policy(cpu, |p, ctx| p.dequeue(ctx, tid, DequeueFlags::SLEEPING))?;
        self.drop_current(cpu, tid);
        self.record(SchedEvent::TaskSlept { cpu, tid });
        Ok(())
    }

    /// `tid` exited; returns its final statistics and releases the slot
    pub fn exit(&mut self, tid: TaskId) -> SchedResult<TaskStats> {
        self.reject_idle(tid, "exit")?;
        let cpu = self.owner_of(tid)?;
        let stats = Accounting::snapshot(self.tasks.get(tid)?, &self.tunables);

        self.with_policy(cpu, |p, ctx| p.task_dead(ctx, tid))?;
        self.tasks.detach(tid)?;
        self.drop_current(cpu, tid);

        log::debug!(
            "sched: {} exited after {} ticks, interact {}",
            tid,
            stats.run_ticks,
            stats.score
        );
        self.record(SchedEvent::TaskExited { cpu, tid });
        Ok(stats)
    }

    /// Change the priority of `tid`
    pub fn set_priority(&mut self, tid: TaskId, priority: Priority) -> SchedResult<()> {
        self.reject_idle(tid, "change priority")?;
        let cpu = self.owner_of(tid)?;
        let old_priority = self.tasks.get(tid)?.priority;
        self.with_policy(cpu, |p, ctx| p.set_priority(ctx, tid, priority))?;
        if old_priority != priority {
            self.record(SchedEvent::PriorityChanged {
                tid,
                old_priority,
                new_priority: priority,
            });
        }
        Ok(())
    }

    /// The task running on `cpu` gives up the rest of its slice
    pub fn yield_now(&mut self, cpu: CpuId) -> SchedResult<()> {
        let idx = self.cpu_index(cpu)?;
        let Some(tid) = self.per_cpu[idx].current else {
            return Ok(());
        };
        self.with_policy(cpu, |p, ctx| p.yield_task(ctx, tid))?;
        self.record(SchedEvent::TaskYielded { cpu, tid });
        Ok(())
    }

    /// `tid` moves into this scheduling class on `cpu`
    ///
    /// With `running` set the task is already executing there and becomes
    /// the CPU's current task.
    pub fn switch_class_in(&mut self, cpu: CpuId, tid: TaskId, running: bool) -> SchedResult<()> {
        let idx = self.cpu_index(cpu)?;
        self.reject_idle(tid, "switch class")?;
        let needs_queue = matches!(
            self.tasks.get(tid)?.state,
            TaskState::Unqueued | TaskState::Sleeping
        );

        self.with_policy(cpu, |p, ctx| {
            if needs_queue {
                p.enqueue(ctx, tid, EnqueueFlags::empty())?;
            }
            p.switched_to(ctx, tid, running)
        })?;
        if running {
            self.per_cpu[idx].current = Some(tid);
        }

        self.record(SchedEvent::ClassChanged {
            cpu,
            tid,
            entering: true,
        });
        Ok(())
    }

    /// `tid` leaves this scheduling class; its slot stays attached
    pub fn switch_class_out(&mut self, tid: TaskId) -> SchedResult<()> {
        self.reject_idle(tid, "switch class")?;
        let cpu = self.owner_of(tid)?;
        let queued = matches!(
            self.tasks.get(tid)?.state,
            TaskState::Queued | TaskState::Running
        );

        self.with_policy(cpu, |p, ctx| {
            p.switched_from(ctx, tid)?;
            if queued {
                p.dequeue(ctx, tid, DequeueFlags::empty())?;
            }
            Ok(())
        })?;
        self.drop_current(cpu, tid);

        self.record(SchedEvent::ClassChanged {
            cpu,
            tid,
            entering: false,
        });
        Ok(())
    }

    // ========================================================================
    // TIMER INTERRUPT HANDLING
    // ========================================================================

    /// Handle a timer tick on `cpu`
    ///
    /// The boot CPU's tick advances the clock. Returns whether the CPU
    /// should reschedule.
    pub fn on_tick(&mut self, cpu: CpuId) -> SchedResult<bool> {
        let idx = self.cpu_index(cpu)?;
        if cpu == CpuId::BSP {
            self.clock = self.clock.wrapping_add(1);
        }

        let state = &mut self.per_cpu[idx];
        state.total_ticks += 1;
        let target = state.current.unwrap_or(state.idle);

        self.with_policy(cpu, |p, ctx| p.tick(ctx, target))?;
        Ok(self.per_cpu[idx].need_resched)
    }

    // ========================================================================
    // CONTEXT SWITCH EXECUTION
    // ========================================================================

    /// Ask the policy what runs next on `cpu`
    ///
    /// The caller performs the actual switch to the returned task, or idles
    /// on None.
    pub fn reschedule(&mut self, cpu: CpuId) -> SchedResult<Option<TaskId>> {
        let idx = self.cpu_index(cpu)?;
        self.per_cpu[idx].clear_reschedule();
        let prev = self.per_cpu[idx].current;

        let decision = self.with_policy(cpu, |p, ctx| p.pick_next(ctx, prev))?;

        let state = &mut self.per_cpu[idx];
        state.current = decision.next;
        if prev != decision.next {
            state.context_switches += 1;
            self.record(SchedEvent::Switched {
                cpu,
                prev,
                next: decision.next,
            });
        }
        Ok(decision.next)
    }

    /// Replace the tunables of every CPU
    pub fn set_tunables(&mut self, tunables: Tunables) -> SchedResult<()> {
        tunables.validate()?;
        for policy in self.policies.iter_mut() {
            policy.set_tunables(tunables)?;
        }
        self.tunables = tunables;
        self.record(SchedEvent::TunablesChanged);
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn task_stats(&self, tid: TaskId) -> SchedResult<TaskStats> {
        Ok(Accounting::snapshot(self.tasks.get(tid)?, &self.tunables))
    }

    pub fn task_state(&self, tid: TaskId) -> SchedResult<TaskState> {
        Ok(self.tasks.get(tid)?.state)
    }

    pub fn task_priority(&self, tid: TaskId) -> SchedResult<Priority> {
        Ok(self.tasks.get(tid)?.priority)
    }

    /// Slice `tid` would get if it were armed now
    pub fn rr_interval(&mut self, tid: TaskId) -> SchedResult<TimeSliceTicks> {
        self.reject_idle(tid, "take a slice")?;
        let cpu = self.owner_of(tid)?;
        self.with_policy(cpu, |p, ctx| p.rr_interval(ctx, tid))
    }

    pub fn queue_stats(&self, cpu: CpuId) -> SchedResult<QueueStats> {
        Ok(self.policies[self.cpu_index(cpu)?].stats())
    }

    pub fn cpu_state(&self, cpu: CpuId) -> SchedResult<&PerCpuSchedState> {
        Ok(&self.per_cpu[self.cpu_index(cpu)?])
    }

    /// Get the task running on a CPU, or None if idle
    pub fn current(&self, cpu: CpuId) -> Option<TaskId> {
        self.per_cpu.get(cpu.as_usize()).and_then(|s| s.current)
    }

    /// Check if a CPU needs to reschedule
    pub fn should_reschedule(&self, cpu: CpuId) -> bool {
        self.per_cpu
            .get(cpu.as_usize())
            .is_some_and(|s| s.need_resched)
    }

    /// Events recorded so far, oldest first
    pub fn recent_events(&self) -> impl Iterator<Item = &SchedEvent> {
        self.events.iter()
    }

    /// Number of attached tasks, idle placeholders included
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl fmt::Debug for SchedulerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerCore")
            .field("policy", &self.policy_name())
            .field("cpus", &self.per_cpu)
            .field("tasks", &self.tasks.len())
            .field("clock", &self.clock)
            .finish()
    }
}
