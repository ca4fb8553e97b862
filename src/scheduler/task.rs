/*
 * Task Scheduling State
 *
 * This module defines the per-task scheduling state (SchedEntity) and the
 * fixed-capacity arena (TaskTable) that holds it.
 *
 * The host owns a task's identity and lifetime. The scheduler only keeps the
 * fields it needs, in an arena slot named by an opaque TaskId. Each slot
 * carries a generation counter: freeing a slot bumps it, so a handle that
 * outlived its task is rejected rather than silently naming a new task.
 *
 * The arena is backed by heapless storage, so attaching and detaching tasks
 * never touches the allocator.
 */

use core::fmt;

use heapless::Vec;

use super::{
    error::{SchedError, SchedResult},
    types::{CpuId, Priority, TaskState},
};

/// Maximum number of tasks the scheduler can track
pub const MAX_TASKS: usize = 256;

/// Opaque task handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    index: u16,
    generation: u32,
}

impl TaskId {
    /// Arena slot this handle refers to
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({}.{})", self.index, self.generation)
    }
}

/// Scheduling state attached to a task
#[derive(Debug, Clone, Copy)]
pub struct SchedEntity {
    pub priority: Priority,
    pub state: TaskState,

    // Interactivity history (fixed point, see config::TICK_SHIFT)
    pub run_time: u32,
    pub sleep_time: u32,
    pub sleep_started_at: Option<u64>,

    // CPU usage estimator
    pub cpu_ticks: u64,
    pub last_tick_time: u64,
    pub first_tick_time: u64,

    pub slice_remaining: u32,
    pub slice_expired: bool,

    /// Bucket while queued
    pub queue_index: Option<u8>,
    /// CPU whose queue holds the task while queued or running
    pub cpu: Option<CpuId>,

    pub is_idle: bool,
}

impl SchedEntity {
    pub fn new(priority: Priority, now: u64) -> Self {
        Self {
            priority,
            state: TaskState::Unqueued,
            run_time: 0,
            sleep_time: 0,
            sleep_started_at: None,
            cpu_ticks: 0,
            last_tick_time: now,
            first_tick_time: now,
            slice_remaining: 0,
            slice_expired: false,
            queue_index: None,
            cpu: None,
            is_idle: false,
        }
    }
}

struct Slot {
    generation: u32,
    entity: Option<SchedEntity>,
}

/// Arena of scheduling entities
pub struct TaskTable {
    slots: Vec<Slot, MAX_TASKS>,
    free: Vec<u16, MAX_TASKS>,
    live: usize,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Start tracking a task at `priority`
    pub fn attach(&mut self, priority: Priority, now: u64) -> SchedResult<TaskId> {
        self.insert(SchedEntity::new(priority, now))
    }

    /// Start tracking an idle placeholder; it is ticked but never expires
    pub fn attach_idle(&mut self, now: u64) -> SchedResult<TaskId> {
        let mut entity = SchedEntity::new(Priority::LOWEST, now);
        entity.is_idle = true;
        self.insert(entity)
    }

    fn insert(&mut self, entity: SchedEntity) -> SchedResult<TaskId> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entity = Some(entity);
            self.live += 1;
            return Ok(TaskId {
                index,
                generation: slot.generation,
            });
        }

        let index = self.slots.len() as u16;
        self.slots
            .push(Slot {
                generation: 0,
                entity: Some(entity),
            })
            .map_err(|_| SchedError::TableFull)?;
        self.live += 1;
        Ok(TaskId {
            index,
            generation: 0,
        })
    }

    /// Stop tracking a task and return its final state
    ///
    /// The slot's generation moves on, so `tid` is stale afterwards.
    pub fn detach(&mut self, tid: TaskId) -> SchedResult<SchedEntity> {
        self.get(tid)?;
        let slot = &mut self.slots[tid.index()];
        let entity = slot.entity.take().ok_or(SchedError::StaleTask(tid))?;
        slot.generation = slot.generation.wrapping_add(1);
        // Cannot overflow: every free index came out of `slots`.
        let _ = self.free.push(tid.index);
        self.live -= 1;
        Ok(entity)
    }

    pub fn get(&self, tid: TaskId) -> SchedResult<&SchedEntity> {
        match self.slots.get(tid.index()) {
            Some(slot) if slot.generation == tid.generation => {
                slot.entity.as_ref().ok_or(SchedError::StaleTask(tid))
            }
            _ => Err(SchedError::StaleTask(tid)),
        }
    }

    pub fn get_mut(&mut self, tid: TaskId) -> SchedResult<&mut SchedEntity> {
        match self.slots.get_mut(tid.index()) {
            Some(slot) if slot.generation == tid.generation => {
                slot.entity.as_mut().ok_or(SchedError::StaleTask(tid))
            }
            _ => Err(SchedError::StaleTask(tid)),
        }
    }

    pub fn contains(&self, tid: TaskId) -> bool {
        self.get(tid).is_ok()
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live tasks
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &SchedEntity)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entity.as_ref().map(|entity| {
                (
                    TaskId {
                        index: index as u16,
                        generation: slot.generation,
                    },
                    entity,
                )
            })
        })
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
