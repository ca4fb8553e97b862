/*
 * KTZ Timesharing Policy
 *
 * This module implements the KTZ scheduling policy: a ULE-style timesharing
 * scheduler with a 64-bucket bitmap run queue, interactivity accounting and
 * load-sensitive time slices.
 *
 * Task lifecycle:
 *
 *   Unqueued -> Queued -> Running -> Queued | Sleeping | Unqueued
 *                  ^                              |
 *                  +----------- Sleeping <--------+
 *
 * and any state -> Dead.
 *
 * A running task is unlinked from its bucket but still counts towards the
 * queue load, which is why the slice computation subtracts one. When it is
 * put back (next pick), it goes to the head of its bucket if it was
 * preempted and to the tail if its slice ran out.
 *
 * Features:
 * - O(1) pick via the run queue bitmap, FIFO within a bucket
 * - Run/sleep history with decay and an interactivity score
 * - Slice recomputed from the current load every time a task is armed
 * - Exactly one reschedule request per expired slice
 */

use super::super::{
    accounting::Accounting,
    config::Tunables,
    error::{SchedError, SchedResult},
    runqueue::{CpuRunQueue, RunQueue},
    slice::SliceCalculator,
    task::{SchedEntity, TaskId},
    traits::{KernelSchedCtx, Scheduler},
    types::{
        CpuId, DequeueFlags, DispatchDecision, EnqueueFlags, Priority, QueueStats, TaskState,
        TimeSliceTicks,
    },
};

/// KTZ scheduling policy for one CPU
pub struct KtzPolicy {
    cpu: CpuId,
    tunables: Tunables,
    queue: CpuRunQueue,
    /// Task picked by the last pick_next, until it is put back or dequeued
    current: Option<TaskId>,
}

impl KtzPolicy {
    /// Create the policy for `cpu` with an empty queue
    pub fn new(cpu: CpuId, tunables: Tunables) -> SchedResult<Self> {
        tunables.validate()?;
        log::info!(
            "ktz: {} ready, slice {}..{} ticks, tickincr {}, interact {}",
            cpu,
            tunables.min_slice,
            tunables.base_slice,
            tunables.tick_increment,
            tunables.interactivity_threshold
        );
        Ok(Self {
            cpu,
            tunables,
            queue: CpuRunQueue::new(),
            current: None,
        })
    }

    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn runqueue(&self) -> &RunQueue {
        &self.queue.runq
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    fn check_owner(&self, tid: TaskId, se: &SchedEntity) -> SchedResult<()> {
        match se.cpu {
            Some(cpu) if cpu != self.cpu => Err(SchedError::WrongCpu { tid, cpu }),
            _ => Ok(()),
        }
    }

    /// Return the previously running task to its bucket
    fn put_prev(&mut self, ctx: &mut dyn KernelSchedCtx, prev: TaskId) -> SchedResult<()> {
        let now = ctx.now_ticks();
        let t = self.tunables;
        let se = ctx.tasks().get_mut(prev)?;

        // Dequeued since it was picked: nothing to put back.
        if se.state != TaskState::Running {
            return Ok(());
        }
        self.check_owner(prev, se)?;
        if self.current != Some(prev) {
            return Err(invalid(prev, se.state, "be put back"));
        }

        let bucket = se.priority.bucket();
        let preempted = !se.slice_expired;
        self.queue.runq.insert(prev, bucket, preempted)?;

        Accounting::update_cpu_usage(se, now, true, &t);
        se.state = TaskState::Queued;
        se.queue_index = Some(bucket as u8);
        se.slice_remaining = 0;
        se.slice_expired = false;
        self.current = None;

        log::trace!(
            "ktz: put back {} at {} of bucket {}",
            prev,
            if preempted { "head" } else { "tail" },
            bucket
        );
        Ok(())
    }
}

impl Scheduler for KtzPolicy {
    fn enqueue(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        tid: TaskId,
        flags: EnqueueFlags,
    ) -> SchedResult<()> {
        if self.cpu.as_usize() >= ctx.cpu_count() {
            return Err(SchedError::InvalidCpu(self.cpu));
        }
        let now = ctx.now_ticks();
        let t = self.tunables;
        let se = ctx.tasks().get_mut(tid)?;

        match se.state {
            TaskState::Unqueued | TaskState::Sleeping => {}
            state => return Err(invalid(tid, state, "enqueue")),
        }

        let bucket = se.priority.bucket();
        self.queue
            .runq
            .insert(tid, bucket, flags.contains(EnqueueFlags::PREEMPTED))?;

        if flags.contains(EnqueueFlags::WAKING) {
            Accounting::record_wake(se, now, &t);
            Accounting::update_cpu_usage(se, now, false, &t);
        } else {
            // Runnable again without a wakeup: the sleep is not credited.
            se.sleep_started_at = None;
        }
        se.slice_remaining = 0;
        se.slice_expired = false;
        se.queue_index = Some(bucket as u8);
        se.cpu = Some(self.cpu);
        se.state = TaskState::Queued;
        self.queue.load_add();

        log::trace!(
            "ktz: enqueue {} bucket {} flags {:?} load {}",
            tid,
            bucket,
            flags,
            self.queue.system_load()
        );
        Ok(())
    }

    fn dequeue(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        tid: TaskId,
        flags: DequeueFlags,
    ) -> SchedResult<()> {
        let now = ctx.now_ticks();
        let t = self.tunables;
        let se = ctx.tasks().get_mut(tid)?;
        self.check_owner(tid, se)?;

        let running = match se.state {
            TaskState::Queued => false,
            TaskState::Running if self.current == Some(tid) => true,
            state => return Err(invalid(tid, state, "dequeue")),
        };
        if self.queue.runnable_count() == 0 {
            return Err(SchedError::LoadUnderflow);
        }

        if !running {
            self.queue.runq.remove(tid)?;
        }
        self.queue.load_rem()?;

        Accounting::update_cpu_usage(se, now, running, &t);
        if flags.contains(DequeueFlags::SLEEPING) {
            Accounting::record_sleep(se, now);
            se.state = TaskState::Sleeping;
        } else {
            se.sleep_started_at = None;
            se.state = TaskState::Unqueued;
        }
        se.queue_index = None;
        se.cpu = None;
        se.slice_remaining = 0;
        se.slice_expired = false;
        if running {
            self.current = None;
        }

        let stats = Accounting::snapshot(se, &t);
        log::debug!(
            "ktz: dequeue {} ({}) run {} sleep {} interact {} cpu {}%",
            tid,
            se.state,
            stats.run_ticks,
            stats.sleep_ticks,
            stats.score,
            stats.cpu_percent
        );
        Ok(())
    }

    fn pick_next(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        prev: Option<TaskId>,
    ) -> SchedResult<DispatchDecision> {
        if let Some(prev) = prev {
            self.put_prev(ctx, prev)?;
        }
        if let Some(current) = self.current {
            self.put_prev(ctx, current)?;
        }

        let Some(bucket) = self.queue.runq.highest_priority_nonempty() else {
            log::trace!("ktz: {} queue empty", self.cpu);
            return Ok(DispatchDecision::idle());
        };
        let next = self
            .queue
            .runq
            .first(bucket)
            .ok_or(SchedError::BitmapCorrupt(bucket))?;

        let now = ctx.now_ticks();
        let t = self.tunables;
        let se = ctx.tasks().get_mut(next)?;
        self.queue.runq.remove(next)?;

        let slice = SliceCalculator::compute(self.queue.system_load(), &t);
        se.state = TaskState::Running;
        se.queue_index = None;
        se.slice_remaining = slice.get();
        se.slice_expired = false;
        Accounting::update_cpu_usage(se, now, false, &t);

        self.current = Some(next);
        if prev != Some(next) {
            self.queue.note_switch();
        }

        log::trace!("ktz: pick {} from bucket {} slice {}", next, bucket, slice.get());
        Ok(DispatchDecision::run_task(next, slice))
    }

    fn tick(&mut self, ctx: &mut dyn KernelSchedCtx, current: TaskId) -> SchedResult<()> {
        let now = ctx.now_ticks();
        let t = self.tunables;
        let cpu = self.cpu;
        let se = ctx.tasks().get_mut(current)?;

        if !se.is_idle {
            self.check_owner(current, se)?;
            if se.state != TaskState::Running || self.current != Some(current) {
                return Err(invalid(current, se.state, "tick"));
            }
        }

        Accounting::record_tick(se, &t);
        Accounting::update_cpu_usage(se, now, true, &t);
        self.queue.roll_switch_counts();

        if se.is_idle || se.slice_remaining == 0 {
            return Ok(());
        }
        se.slice_remaining -= 1;
        if se.slice_remaining > 0 {
            return Ok(());
        }

        se.slice_expired = true;
        log::trace!("ktz: {} slice expired on {}", current, cpu);
        ctx.request_reschedule(cpu);
        Ok(())
    }

    fn set_priority(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        tid: TaskId,
        priority: Priority,
    ) -> SchedResult<()> {
        let se = ctx.tasks().get_mut(tid)?;
        let old = se.priority;
        if old == priority {
            return Ok(());
        }

        let mut preempt = false;
        match se.state {
            TaskState::Queued => {
                self.check_owner(tid, se)?;
                let bucket = priority.bucket();
                self.queue.runq.remove(tid)?;
                self.queue.runq.insert(tid, bucket, false)?;
                se.queue_index = Some(bucket as u8);
            }
            TaskState::Running => {
                self.check_owner(tid, se)?;
                preempt = self
                    .queue
                    .runq
                    .highest_priority_nonempty()
                    .is_some_and(|best| best < priority.bucket());
            }
            _ => {}
        }
        se.priority = priority;

        log::debug!("ktz: {} priority {} -> {}", tid, old.0, priority.0);
        if preempt {
            ctx.request_reschedule(self.cpu);
        }
        Ok(())
    }

    fn switched_to(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        tid: TaskId,
        running: bool,
    ) -> SchedResult<()> {
        let now = ctx.now_ticks();
        let t = self.tunables;
        let se = ctx.tasks().get_mut(tid)?;
        self.check_owner(tid, se)?;

        if !running {
            log::debug!("ktz: {} joined the class", tid);
            return Ok(());
        }
        if self.current.is_some_and(|current| current != tid) {
            return Err(invalid(tid, se.state, "take over a busy CPU"));
        }

        match se.state {
            TaskState::Running => {}
            TaskState::Queued => {
                self.queue.runq.remove(tid)?;
            }
            state => return Err(invalid(tid, state, "start running")),
        }

        // Already on the CPU: start the clock now instead of at the next tick.
        let slice = SliceCalculator::compute(self.queue.system_load(), &t);
        se.state = TaskState::Running;
        se.queue_index = None;
        se.slice_remaining = slice.get();
        se.slice_expired = false;
        Accounting::update_cpu_usage(se, now, false, &t);
        self.current = Some(tid);

        log::debug!("ktz: {} joined the class running, slice {}", tid, slice.get());
        Ok(())
    }

    fn switched_from(&mut self, ctx: &mut dyn KernelSchedCtx, tid: TaskId) -> SchedResult<()> {
        let now = ctx.now_ticks();
        let t = self.tunables;
        let se = ctx.tasks().get_mut(tid)?;
        self.check_owner(tid, se)?;

        let running = se.state == TaskState::Running && self.current == Some(tid);
        Accounting::update_cpu_usage(se, now, running, &t);
        log::debug!("ktz: {} left the class", tid);
        Ok(())
    }

    fn task_fork(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        parent: TaskId,
        child: TaskId,
    ) -> SchedResult<()> {
        let t = self.tunables;
        let tasks = ctx.tasks();
        let mut parent_se = *tasks.get(parent)?;
        let child_se = tasks.get_mut(child)?;

        if parent == child || child_se.state != TaskState::Unqueued {
            return Err(invalid(child, child_se.state, "be forked"));
        }

        Accounting::inherit_history(child_se, &mut parent_se, &t);
        child_se.priority = parent_se.priority;
        *tasks.get_mut(parent)? = parent_se;

        log::debug!("ktz: {} forked {}", parent, child);
        Ok(())
    }

    fn task_dead(&mut self, ctx: &mut dyn KernelSchedCtx, tid: TaskId) -> SchedResult<()> {
        let se = ctx.tasks().get_mut(tid)?;

        match se.state {
            TaskState::Queued => {
                self.check_owner(tid, se)?;
                if self.queue.runnable_count() == 0 {
                    return Err(SchedError::LoadUnderflow);
                }
                self.queue.runq.remove(tid)?;
                self.queue.load_rem()?;
            }
            TaskState::Running => {
                self.check_owner(tid, se)?;
                if self.current != Some(tid) {
                    return Err(invalid(tid, se.state, "die"));
                }
                self.queue.load_rem()?;
                self.current = None;
            }
            TaskState::Unqueued | TaskState::Sleeping => {}
            TaskState::Dead => return Err(invalid(tid, se.state, "die")),
        }

        se.state = TaskState::Dead;
        se.run_time = 0;
        se.sleep_time = 0;
        se.sleep_started_at = None;
        se.cpu_ticks = 0;
        se.slice_remaining = 0;
        se.slice_expired = false;
        se.queue_index = None;
        se.cpu = None;

        log::debug!("ktz: {} dead", tid);
        Ok(())
    }

    fn yield_task(&mut self, ctx: &mut dyn KernelSchedCtx, tid: TaskId) -> SchedResult<()> {
        let se = ctx.tasks().get_mut(tid)?;
        if se.state != TaskState::Running || self.current != Some(tid) {
            return Err(invalid(tid, se.state, "yield"));
        }

        // Treated like an expired slice: back of the bucket.
        se.slice_expired = true;
        se.slice_remaining = 0;
        ctx.request_reschedule(self.cpu);
        Ok(())
    }

    fn check_preempt(&mut self, ctx: &mut dyn KernelSchedCtx, woken: TaskId) -> SchedResult<()> {
        let tasks = ctx.tasks();
        let woken_bucket = tasks.get(woken)?.priority.bucket();

        let preempt = match self.current {
            Some(current) => woken_bucket < tasks.get(current)?.priority.bucket(),
            None => true,
        };
        if preempt {
            log::trace!("ktz: {} preempts on {}", woken, self.cpu);
            ctx.request_reschedule(self.cpu);
        }
        Ok(())
    }

    fn rr_interval(&self, ctx: &mut dyn KernelSchedCtx, tid: TaskId) -> SchedResult<TimeSliceTicks> {
        ctx.tasks().get(tid)?;
        Ok(SliceCalculator::compute(self.queue.system_load(), &self.tunables))
    }

    fn set_tunables(&mut self, tunables: Tunables) -> SchedResult<()> {
        tunables.validate()?;
        log::info!(
            "ktz: {} tunables now slice {}..{} interact {}",
            self.cpu,
            tunables.min_slice,
            tunables.base_slice,
            tunables.interactivity_threshold
        );
        self.tunables = tunables;
        Ok(())
    }

    fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    fn name(&self) -> &'static str {
        "KTZ"
    }
}

fn invalid(tid: TaskId, state: TaskState, op: &'static str) -> SchedError {
    SchedError::InvalidState { tid, state, op }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestCtx;

    fn policy() -> KtzPolicy {
        KtzPolicy::new(CpuId::BSP, Tunables::default()).unwrap()
    }

    #[test]
    fn test_init_is_empty() {
        let p = policy();
        let stats = p.stats();
        assert_eq!(stats.bitmap, 0);
        assert_eq!(stats.runnable_count, 0);
        assert_eq!(stats.system_load, 0);
        assert_eq!(p.name(), "KTZ");
        assert!(KtzPolicy::new(CpuId::BSP, Tunables::default().with_slices(1, 2)).is_err());
    }

    #[test]
    fn test_enqueue_dequeue_round_trip() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let tid = ctx.spawn(Priority(12));

        p.enqueue(&mut ctx, tid, EnqueueFlags::empty()).unwrap();
        let se = ctx.tasks.get(tid).unwrap();
        assert_eq!(se.state, TaskState::Queued);
        assert_eq!(se.queue_index, Some(3));
        assert_eq!(p.stats().bitmap, 1 << 3);
        assert_eq!(p.stats().runnable_count, 1);

        p.dequeue(&mut ctx, tid, DequeueFlags::empty()).unwrap();
        assert_eq!(ctx.tasks.get(tid).unwrap().state, TaskState::Unqueued);
        assert_eq!(p.stats(), policy().stats());
    }

    #[test]
    fn test_double_enqueue_rejected() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let tid = ctx.spawn(Priority::NORMAL);

        p.enqueue(&mut ctx, tid, EnqueueFlags::empty()).unwrap();
        let err = p.enqueue(&mut ctx, tid, EnqueueFlags::empty()).unwrap_err();
        assert!(matches!(err, SchedError::InvalidState { op: "enqueue", .. }));
        assert_eq!(p.stats().runnable_count, 1);
    }

    #[test]
    fn test_dequeue_unknown_task_rejected() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let tid = ctx.spawn(Priority::NORMAL);

        let err = p.dequeue(&mut ctx, tid, DequeueFlags::SLEEPING).unwrap_err();
        assert!(matches!(err, SchedError::InvalidState { state: TaskState::Unqueued, .. }));
        assert_eq!(p.stats().runnable_count, 0);
    }

    #[test]
    fn test_sleep_then_wake_credits_sleep_time() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let tid = ctx.spawn(Priority::NORMAL);

        p.enqueue(&mut ctx, tid, EnqueueFlags::empty()).unwrap();
        ctx.now = 10;
        p.dequeue(&mut ctx, tid, DequeueFlags::SLEEPING).unwrap();
        assert_eq!(ctx.tasks.get(tid).unwrap().state, TaskState::Sleeping);

        ctx.now = 35;
        p.enqueue(&mut ctx, tid, EnqueueFlags::WAKING).unwrap();
        let se = ctx.tasks.get(tid).unwrap();
        assert_eq!(se.sleep_time, 25 * p.tunables().tick_increment);
        assert_eq!(se.state, TaskState::Queued);
    }

    #[test]
    fn test_preempted_enqueue_goes_to_head() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority::NORMAL);
        let b = ctx.spawn(Priority::NORMAL);
        let c = ctx.spawn(Priority::NORMAL);
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();
        p.enqueue(&mut ctx, b, EnqueueFlags::empty()).unwrap();
        p.enqueue(&mut ctx, c, EnqueueFlags::PREEMPTED).unwrap();

        let mut order = alloc::vec::Vec::new();
        for _ in 0..3 {
            let next = p.pick_next(&mut ctx, None).unwrap().next.unwrap();
            p.dequeue(&mut ctx, next, DequeueFlags::empty()).unwrap();
            order.push(next);
        }
        assert_eq!(order, [c, a, b]);
    }

    #[test]
    fn test_requeue_without_wakeup_drops_sleep_start() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority::NORMAL);
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();
        p.dequeue(&mut ctx, a, DequeueFlags::SLEEPING).unwrap();

        // Requeued by a class change, not a wakeup.
        ctx.now = 10;
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();
        assert_eq!(ctx.tasks.get(a).unwrap().sleep_started_at, None);
        ctx.now = 60;
        p.dequeue(&mut ctx, a, DequeueFlags::empty()).unwrap();

        ctx.now = 61;
        p.enqueue(&mut ctx, a, EnqueueFlags::WAKING).unwrap();
        assert_eq!(ctx.tasks.get(a).unwrap().sleep_time, 0);
    }

    #[test]
    fn test_enqueue_on_missing_cpu_rejected() {
        let mut ctx = TestCtx::new();
        let mut p = KtzPolicy::new(CpuId(5), Tunables::default()).unwrap();
        let a = ctx.spawn(Priority::NORMAL);
        assert_eq!(
            p.enqueue(&mut ctx, a, EnqueueFlags::empty()),
            Err(SchedError::InvalidCpu(CpuId(5)))
        );
        assert_eq!(ctx.tasks.get(a).unwrap().state, TaskState::Unqueued);
    }

    #[test]
    fn test_pick_arms_slice_and_unlinks() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority::NORMAL);
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();

        let decision = p.pick_next(&mut ctx, None).unwrap();
        assert_eq!(decision.next, Some(a));
        assert_eq!(decision.timeslice, TimeSliceTicks(10));

        let se = ctx.tasks.get(a).unwrap();
        assert_eq!(se.state, TaskState::Running);
        assert_eq!(se.queue_index, None);
        assert_eq!(se.slice_remaining, 10);
        assert!(p.runqueue().is_empty());
        assert_eq!(p.stats().runnable_count, 1);
        assert_eq!(p.current(), Some(a));
    }

    #[test]
    fn test_expired_task_goes_to_tail_preempted_to_head() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority::NORMAL);
        let b = ctx.spawn(Priority::NORMAL);
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();
        p.enqueue(&mut ctx, b, EnqueueFlags::empty()).unwrap();

        // Preempted before its slice ran out: A keeps its place.
        assert_eq!(p.pick_next(&mut ctx, None).unwrap().next, Some(a));
        assert_eq!(p.pick_next(&mut ctx, Some(a)).unwrap().next, Some(a));

        // Slice used up: B gets its turn.
        p.yield_task(&mut ctx, a).unwrap();
        assert_eq!(ctx.resched.len(), 1);
        assert_eq!(p.pick_next(&mut ctx, Some(a)).unwrap().next, Some(b));
        let bucket = Priority::NORMAL.bucket();
        assert_eq!(p.runqueue().iter_bucket(bucket).collect::<alloc::vec::Vec<_>>(), [a]);
    }

    #[test]
    fn test_tick_requests_one_reschedule() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority::NORMAL);
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();
        p.pick_next(&mut ctx, None).unwrap();

        for _ in 0..9 {
            p.tick(&mut ctx, a).unwrap();
        }
        assert!(ctx.resched.is_empty());
        assert_eq!(ctx.tasks.get(a).unwrap().slice_remaining, 1);

        p.tick(&mut ctx, a).unwrap();
        assert_eq!(ctx.resched, [CpuId::BSP]);
        assert!(ctx.tasks.get(a).unwrap().slice_expired);

        // Host has not rescheduled yet; no repeated request.
        p.tick(&mut ctx, a).unwrap();
        assert_eq!(ctx.resched.len(), 1);
        assert_eq!(ctx.tasks.get(a).unwrap().run_time, 11 * p.tunables().tick_increment);
    }

    #[test]
    fn test_tick_on_queued_task_rejected() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority::NORMAL);
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();
        assert!(p.tick(&mut ctx, a).is_err());
    }

    #[test]
    fn test_idle_placeholder_never_expires() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let idle = ctx.tasks.attach_idle(0).unwrap();
        ctx.tasks.get_mut(idle).unwrap().slice_remaining = 1;

        for _ in 0..20 {
            p.tick(&mut ctx, idle).unwrap();
        }
        assert!(ctx.resched.is_empty());
        assert_eq!(ctx.tasks.get(idle).unwrap().slice_remaining, 1);
    }

    #[test]
    fn test_set_priority_rebuckets_queued_task() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority(40));
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();

        p.set_priority(&mut ctx, a, Priority(8)).unwrap();
        assert_eq!(p.runqueue().bucket_of(a), Some(2));
        assert_eq!(p.stats().bitmap, 1 << 2);
        assert_eq!(ctx.tasks.get(a).unwrap().queue_index, Some(2));
    }

    #[test]
    fn test_lowering_running_priority_preempts() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority(8));
        let b = ctx.spawn(Priority(20));
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();
        p.enqueue(&mut ctx, b, EnqueueFlags::empty()).unwrap();
        p.pick_next(&mut ctx, None).unwrap();

        p.set_priority(&mut ctx, a, Priority(12)).unwrap();
        assert!(ctx.resched.is_empty());
        p.set_priority(&mut ctx, a, Priority(60)).unwrap();
        assert_eq!(ctx.resched, [CpuId::BSP]);
    }

    #[test]
    fn test_check_preempt_only_for_better_bucket() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority(40));
        let same = ctx.spawn(Priority(41));
        let better = ctx.spawn(Priority(4));
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();
        p.pick_next(&mut ctx, None).unwrap();

        p.enqueue(&mut ctx, same, EnqueueFlags::WAKING).unwrap();
        p.check_preempt(&mut ctx, same).unwrap();
        assert!(ctx.resched.is_empty());

        p.enqueue(&mut ctx, better, EnqueueFlags::WAKING).unwrap();
        p.check_preempt(&mut ctx, better).unwrap();
        assert_eq!(ctx.resched.len(), 1);
    }

    #[test]
    fn test_switched_to_running_starts_clock() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority::NORMAL);
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();

        ctx.now = 50;
        p.switched_to(&mut ctx, a, true).unwrap();
        let se = ctx.tasks.get(a).unwrap();
        assert_eq!(se.state, TaskState::Running);
        assert_eq!(se.last_tick_time, 50);
        assert_eq!(se.slice_remaining, 10);
        assert_eq!(p.current(), Some(a));
        assert!(p.runqueue().is_empty());

        ctx.now = 60;
        p.switched_from(&mut ctx, a).unwrap();
        let se = ctx.tasks.get(a).unwrap();
        assert_eq!(se.cpu_ticks, 10 * u64::from(p.tunables().tick_increment));
    }

    #[test]
    fn test_fork_inherits_priority_and_history() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let parent = ctx.spawn(Priority(33));
        ctx.tasks.get_mut(parent).unwrap().sleep_time = 10 * 1024;
        let child = ctx.spawn(Priority::NORMAL);

        p.task_fork(&mut ctx, parent, child).unwrap();
        let child_se = ctx.tasks.get(child).unwrap();
        assert_eq!(child_se.priority, Priority(33));
        assert_eq!(child_se.sleep_time, 10 * 1024);
        assert_eq!(ctx.tasks.get(parent).unwrap().run_time, 1024);

        assert!(p.task_fork(&mut ctx, parent, parent).is_err());
    }

    #[test]
    fn test_dead_task_leaves_queue() {
        let mut ctx = TestCtx::new();
        let mut p = policy();
        let a = ctx.spawn(Priority::NORMAL);
        let b = ctx.spawn(Priority::NORMAL);
        p.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();
        p.enqueue(&mut ctx, b, EnqueueFlags::empty()).unwrap();
        p.pick_next(&mut ctx, None).unwrap();

        p.task_dead(&mut ctx, b).unwrap();
        p.task_dead(&mut ctx, a).unwrap();
        assert_eq!(p.stats().runnable_count, 0);
        assert_eq!(p.stats().bitmap, 0);
        assert_eq!(p.current(), None);
        assert_eq!(ctx.tasks.get(a).unwrap().state, TaskState::Dead);
        assert!(p.task_dead(&mut ctx, a).is_err());
        assert_eq!(p.pick_next(&mut ctx, None).unwrap(), DispatchDecision::idle());
    }

    #[test]
    fn test_wrong_cpu_rejected() {
        let mut ctx = TestCtx::new();
        let mut p0 = policy();
        let mut p1 = KtzPolicy::new(CpuId(1), Tunables::default()).unwrap();
        let a = ctx.spawn(Priority::NORMAL);
        p0.enqueue(&mut ctx, a, EnqueueFlags::empty()).unwrap();

        assert_eq!(
            p1.dequeue(&mut ctx, a, DequeueFlags::empty()),
            Err(SchedError::WrongCpu { tid: a, cpu: CpuId::BSP })
        );
        assert!(p1.set_priority(&mut ctx, a, Priority(0)).is_err());
    }
}
