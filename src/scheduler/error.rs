/*
 * Scheduler Errors
 *
 * Every way a caller can breach the policy's contract maps to one of these
 * variants. The policy never guesses its way past a broken invariant: it
 * reports the error and leaves the queue untouched, so the host can treat it
 * as a scheduler malfunction instead of silently running the wrong task.
 */

use core::fmt;

use super::{task::TaskId, types::{CpuId, TaskState}};

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Handle does not name a live task (freed slot or wrong generation)
    StaleTask(TaskId),
    /// Task arena has no free slot
    TableFull,
    /// Task is not linked into the run queue it claims to be on
    NotQueued(TaskId),
    /// Task is already linked into a run queue
    AlreadyQueued(TaskId),
    /// Bucket index outside the run queue
    InvalidBucket(usize),
    /// Operation is not legal from the task's current lifecycle state
    InvalidState {
        tid: TaskId,
        state: TaskState,
        op: &'static str,
    },
    /// Load counter would go negative
    LoadUnderflow,
    /// Bitmap claims a bucket is populated but it is empty (or vice versa)
    BitmapCorrupt(usize),
    /// Task belongs to another CPU's queue
    WrongCpu { tid: TaskId, cpu: CpuId },
    /// CPU index outside the configured set
    InvalidCpu(CpuId),
    /// Tunables rejected by validation or parsing
    InvalidTunables(&'static str),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::StaleTask(tid) => write!(f, "Stale task handle {}", tid),
            SchedError::TableFull => write!(f, "Task table full"),
            SchedError::NotQueued(tid) => write!(f, "{} is not on the run queue", tid),
            SchedError::AlreadyQueued(tid) => write!(f, "{} is already on a run queue", tid),
            SchedError::InvalidBucket(bucket) => write!(f, "Invalid run queue bucket {}", bucket),
            SchedError::InvalidState { tid, state, op } => {
                write!(f, "{} cannot {} while {}", tid, op, state)
            }
            SchedError::LoadUnderflow => write!(f, "Run queue load underflow"),
            SchedError::BitmapCorrupt(bucket) => {
                write!(f, "Run queue bitmap inconsistent at bucket {}", bucket)
            }
            SchedError::WrongCpu { tid, cpu } => write!(f, "{} is owned by {}", tid, cpu),
            SchedError::InvalidCpu(cpu) => write!(f, "No such CPU {}", cpu),
            SchedError::InvalidTunables(why) => write!(f, "Invalid tunables: {}", why),
        }
    }
}
